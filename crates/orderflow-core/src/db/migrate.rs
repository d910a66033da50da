//! Database migration system for orderflow
//!
//! Runs embedded migrations on startup and tracks applied versions.
//! Also supports seeding demo data for local runs.

use sqlx::PgPool;
use tracing::info;

use crate::{Error, Result};

/// One embedded migration step
struct MigrationStep {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        name: "create_users",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                name VARCHAR(100) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        "#,
    },
    MigrationStep {
        version: 2,
        name: "create_products",
        sql: r#"
            CREATE TABLE IF NOT EXISTS products (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                description VARCHAR(1000),
                category VARCHAR(100),
                price NUMERIC(10, 2) NOT NULL,
                stock_quantity INT NOT NULL DEFAULT 0,
                reserved_quantity INT NOT NULL DEFAULT 0,
                sold_quantity INT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT chk_reserved_non_negative CHECK (reserved_quantity >= 0),
                CONSTRAINT chk_reserved_within_stock CHECK (stock_quantity >= reserved_quantity)
            );
            CREATE INDEX IF NOT EXISTS idx_products_category ON products (category);
        "#,
    },
    MigrationStep {
        version: 3,
        name: "create_reservations",
        sql: r#"
            DO $$ BEGIN
                CREATE TYPE reservation_status AS ENUM ('pending', 'confirmed', 'released', 'expired');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$;

            CREATE TABLE IF NOT EXISTS reservations (
                id UUID PRIMARY KEY,
                group_id UUID NOT NULL,
                order_id UUID NOT NULL,
                sku_id UUID NOT NULL,
                quantity INT NOT NULL,
                status reservation_status NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL,
                confirmed_at TIMESTAMPTZ,
                released_at TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS idx_reservations_order ON reservations (order_id);
            CREATE INDEX IF NOT EXISTS idx_reservations_expiry ON reservations (status, expires_at);
            CREATE UNIQUE INDEX IF NOT EXISTS uq_reservations_order_sku ON reservations (order_id, sku_id);
        "#,
    },
    MigrationStep {
        version: 4,
        name: "create_orders",
        sql: r#"
            DO $$ BEGIN
                CREATE TYPE order_status AS ENUM
                    ('pending', 'confirmed', 'processing', 'shipped', 'delivered', 'cancelled', 'failed');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$;

            CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                status order_status NOT NULL DEFAULT 'pending',
                total_amount NUMERIC(10, 2) NOT NULL,
                shipping_address VARCHAR(500) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id);

            CREATE TABLE IF NOT EXISTS order_items (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL REFERENCES orders (id),
                product_id UUID NOT NULL,
                product_name VARCHAR(255) NOT NULL,
                quantity INT NOT NULL,
                unit_price NUMERIC(10, 2) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items (order_id);
        "#,
    },
    MigrationStep {
        version: 5,
        name: "create_payments",
        sql: r#"
            DO $$ BEGIN
                CREATE TYPE payment_status AS ENUM
                    ('pending', 'processing', 'completed', 'failed', 'refunded');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$;

            DO $$ BEGIN
                CREATE TYPE payment_method AS ENUM
                    ('credit_card', 'debit_card', 'paypal', 'bank_transfer');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$;

            CREATE TABLE IF NOT EXISTS payments (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL,
                user_id UUID NOT NULL,
                amount NUMERIC(10, 2) NOT NULL,
                status payment_status NOT NULL DEFAULT 'pending',
                payment_method payment_method NOT NULL DEFAULT 'credit_card',
                transaction_id VARCHAR(100),
                error_message VARCHAR(500),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_payments_order ON payments (order_id);
            CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_completed_order
                ON payments (order_id) WHERE status = 'completed';
        "#,
    },
    MigrationStep {
        version: 6,
        name: "create_outbox_events",
        sql: r#"
            DO $$ BEGIN
                CREATE TYPE outbox_status AS ENUM ('pending', 'published', 'failed');
            EXCEPTION WHEN duplicate_object THEN NULL; END $$;

            CREATE TABLE IF NOT EXISTS outbox_events (
                id UUID PRIMARY KEY,
                aggregate_type VARCHAR(50) NOT NULL,
                aggregate_id VARCHAR(100) NOT NULL,
                event_type VARCHAR(100) NOT NULL,
                payload JSONB NOT NULL,
                partition_key VARCHAR(100) NOT NULL,
                topic VARCHAR(100) NOT NULL,
                status outbox_status NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                published_at TIMESTAMPTZ,
                retry_count INT NOT NULL DEFAULT 0,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_outbox_status_created ON outbox_events (status, created_at);
            CREATE INDEX IF NOT EXISTS idx_outbox_aggregate ON outbox_events (aggregate_id);
        "#,
    },
];

/// Database migration manager
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_migration_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Run all pending migrations
    pub async fn run(&self) -> Result<()> {
        self.init_migration_table().await?;
        let applied = self.applied_versions().await?;

        for step in MIGRATIONS {
            if applied.contains(&step.version) {
                continue;
            }

            info!("Applying migration {}: {}", step.version, step.name);

            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            sqlx::raw_sql(step.sql)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            sqlx::query("INSERT INTO _migrations (version, name) VALUES ($1, $2)")
                .bind(step.version)
                .bind(step.name)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            tx.commit().await.map_err(Error::Database)?;
        }

        Ok(())
    }

    /// Seed demo products for local runs
    pub async fn seed_demo_data(&self) -> Result<()> {
        let seeded: Option<(i64,)> = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        if matches!(seeded, Some((n,)) if n > 0) {
            info!("Products already present, skipping seed");
            return Ok(());
        }

        let demo: [(&str, &str, &str, i32); 3] = [
            ("Mechanical Keyboard", "electronics", "10.00", 100),
            ("USB-C Hub", "electronics", "15.50", 80),
            ("Desk Mat", "accessories", "25.00", 50),
        ];

        for (name, category, price, stock) in demo {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, category, price, stock_quantity)
                VALUES ($1, $2, $3, $4::numeric, $5)
                "#,
            )
            .bind(uuid::Uuid::new_v4())
            .bind(name)
            .bind(category)
            .bind(price)
            .bind(stock)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        }

        info!("Seeded {} demo products", demo.len());
        Ok(())
    }
}

/// Run migrations against a pool
pub async fn auto_migrate(pool: &PgPool) -> Result<()> {
    Migrator::new(pool.clone()).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let mut last = 0;
        for step in MIGRATIONS {
            assert!(step.version > last, "migration versions must increase");
            last = step.version;
        }
    }

    #[test]
    fn test_schema_covers_all_tables() {
        let all_sql: String = MIGRATIONS.iter().map(|m| m.sql).collect();
        for table in [
            "users",
            "products",
            "reservations",
            "orders",
            "order_items",
            "payments",
            "outbox_events",
        ] {
            assert!(all_sql.contains(table), "missing table {}", table);
        }
    }
}
