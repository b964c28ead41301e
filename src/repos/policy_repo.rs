/*
 * Responsibility
 * - Postgres (SQLx) implementation of `PolicyStore`
 * - users / roles / access_permissions / services と join テーブルの参照のみ
 * - DB エラーは RepoError に変換して返す
 */
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::repos::error::RepoResult;
use crate::repos::model::{AccessPermission, Role, Service, User};
use crate::repos::store::PolicyStore;

#[derive(Clone, Debug)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    ///
    /// `acquire_timeout` bounds how long a lookup may wait for a connection.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_service_by_name(&self, name: &str) -> RepoResult<Option<Service>> {
        let row = sqlx::query_as::<_, Service>(
            r#"
            SELECT id, name, base_url
            FROM services
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn user_roles(&self, user_id: Uuid) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn service_roles(&self, service_id: Uuid) -> RepoResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name
            FROM roles r
            JOIN service_roles sr ON sr.role_id = r.id
            WHERE sr.service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn role_permissions(&self, role_id: Uuid) -> RepoResult<Vec<AccessPermission>> {
        let rows = sqlx::query_as::<_, AccessPermission>(
            r#"
            SELECT ap.id, ap.action, ap.resource_pattern
            FROM access_permissions ap
            JOIN role_access_permissions rap ON rap.access_permission_id = ap.id
            WHERE rap.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
