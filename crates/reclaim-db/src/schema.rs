//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Configuration
-- ============================================================

CREATE TABLE IF NOT EXISTS global_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    updated_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT NOT NULL,
    changed_by TEXT NOT NULL,
    changed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_config_history_key ON config_history(key);

-- ============================================================
-- Catalog
-- ============================================================

-- payment_mode is deliberately unconstrained: rows written by older admin
-- tooling are rejected at read time, not at insert time.
CREATE TABLE IF NOT EXISTS skus (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    payment_mode TEXT NOT NULL,
    price INTEGER NOT NULL CHECK (price >= 0),
    impact_multiplier REAL NOT NULL,
    requires_validation INTEGER NOT NULL DEFAULT 0,
    corsair_threshold INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS merchants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    stripe_account_id TEXT,
    created_at INTEGER NOT NULL
);

-- ============================================================
-- Users
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    registration_level TEXT NOT NULL
        CHECK (registration_level IN ('minimal', 'standard', 'full')),
    first_name TEXT,
    last_name TEXT,
    date_of_birth TEXT,
    street TEXT,
    city TEXT,
    postal_code TEXT,
    country TEXT,
    terms_accepted INTEGER NOT NULL DEFAULT 0,
    corsair_connect_flag INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- ============================================================
-- Ledgers
-- ============================================================

CREATE TABLE IF NOT EXISTS wallets (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    owner_type TEXT NOT NULL CHECK (owner_type IN ('user', 'merchant')),
    total_accumulated INTEGER NOT NULL DEFAULT 0,
    total_redeemed INTEGER NOT NULL DEFAULT 0,
    current_balance INTEGER NOT NULL DEFAULT 0,
    total_amount_spent INTEGER NOT NULL DEFAULT 0,
    certified_asset_status INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    UNIQUE (owner_id, owner_type),
    CHECK (current_balance = total_accumulated - total_redeemed),
    CHECK (current_balance >= 0)
);

CREATE TABLE IF NOT EXISTS wallet_adjustments (
    id TEXT PRIMARY KEY,
    wallet_id TEXT NOT NULL REFERENCES wallets(id),
    delta_grams INTEGER NOT NULL CHECK (delta_grams != 0),
    reason TEXT NOT NULL,
    adjusted_by TEXT NOT NULL,
    balance_before INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_adjustments_wallet ON wallet_adjustments(wallet_id);

CREATE TABLE IF NOT EXISTS gift_card_codes (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    sku_id TEXT NOT NULL REFERENCES skus(id),
    is_redeemed INTEGER NOT NULL DEFAULT 0,
    redeemed_at INTEGER,
    redeemed_by TEXT REFERENCES users(id),
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_gift_cards_sku ON gift_card_codes(sku_id);

-- ============================================================
-- Settlement
-- ============================================================

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    sku_id TEXT NOT NULL REFERENCES skus(id),
    master_id TEXT NOT NULL,
    merchant_id TEXT REFERENCES merchants(id),
    partner_id TEXT,
    order_id TEXT,
    amount INTEGER NOT NULL CHECK (amount >= 0),
    calculated_impact INTEGER NOT NULL CHECK (calculated_impact >= 0),
    payment_status TEXT NOT NULL
        CHECK (payment_status IN ('pending', 'completed', 'failed', 'n/a')),
    checkout_ref TEXT NOT NULL UNIQUE,
    gateway_reference TEXT,
    stripe_payment_intent_id TEXT,
    application_fee INTEGER,
    gift_card_code_id TEXT REFERENCES gift_card_codes(id),
    corsair_connect_flag INTEGER NOT NULL DEFAULT 0,
    corsair_threshold INTEGER NOT NULL CHECK (corsair_threshold > 0),
    created_by TEXT,
    created_at INTEGER NOT NULL,
    settled_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_payment_intent
    ON transactions(stripe_payment_intent_id)
    WHERE stripe_payment_intent_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_gift_card
    ON transactions(gift_card_code_id)
    WHERE gift_card_code_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_tx_gateway_ref ON transactions(gateway_reference);
CREATE INDEX IF NOT EXISTS idx_tx_user ON transactions(user_id);
"#;
