//! Test harness with testcontainers for store integration testing.
//!
//! Containers are started once on first use and reused by every test; the
//! migrations run once against the shared database.

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    // Keep containers alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let redis = Redis::default()
            .start()
            .await
            .context("Failed to start Redis container")?;

        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{}:{}", redis_host, redis_port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test handle on the shared containers.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let role = ctx.create_role("reader").await;
/// }
/// ```
pub struct TestHarness {
    pub db_pool: PgPool,
    pub redis_url: String,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        // Database pool is automatically dropped
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self {
            db_pool,
            redis_url: infra.redis_url.clone(),
        })
    }

    /// Insert a user with a unique email and return its id.
    pub async fn create_user(&self, password: &str) -> (i32, String) {
        let email = format!("user-{}@example.com", uuid::Uuid::new_v4().simple());
        let hash = bcrypt::hash(password, 4).expect("bcrypt hash");
        let id: i32 =
            sqlx::query_scalar("INSERT INTO users (email, password) VALUES ($1, $2) RETURNING id")
                .bind(&email)
                .bind(hash)
                .fetch_one(&self.db_pool)
                .await
                .expect("Failed to create user");
        (id, email)
    }

    /// Insert a uniquely named role and attach it to `user`.
    pub async fn create_role(&self, user: i32) -> i32 {
        let role: i32 =
            sqlx::query_scalar("INSERT INTO roles (name) VALUES ($1) RETURNING id")
                .bind(format!("role-{}", uuid::Uuid::new_v4().simple()))
                .fetch_one(&self.db_pool)
                .await
                .expect("Failed to create role");
        sqlx::query("INSERT INTO userroles (userid, roleid) VALUES ($1, $2)")
            .bind(user)
            .bind(role)
            .execute(&self.db_pool)
            .await
            .expect("Failed to attach role");
        role
    }

    pub async fn grant(&self, role: i32, table: &str, read: bool, delete: bool) {
        sqlx::query(
            r#"INSERT INTO grants (roleid, ontable, read, "create", update, delete)
               VALUES ($1, $2, $3, false, false, $4)"#,
        )
        .bind(role)
        .bind(table)
        .bind(read)
        .bind(delete)
        .execute(&self.db_pool)
        .await
        .expect("Failed to insert grant");
    }

    pub async fn allow_field(&self, role: i32, parent: &str, field: &str, allowed: bool) {
        sqlx::query(
            "INSERT INTO field_permissions (roleid, parent, field, allowed) VALUES ($1, $2, $3, $4)",
        )
        .bind(role)
        .bind(parent)
        .bind(field)
        .bind(allowed)
        .execute(&self.db_pool)
        .await
        .expect("Failed to insert field permission");
    }
}
