use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_COMPANY_IDS: &[&str] = &["seed-cmp-001"];

const SEED_EMPLOYEE_IDS: &[&str] =
    &["seed-emp-admin", "seed-emp-mgr", "seed-emp-rep1", "seed-emp-rep2"];

const SEED_EXPENSE_IDS: &[&str] = &["seed-exp-pending", "seed-exp-approved", "seed-exp-rejected"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub companies: usize,
    pub employees: usize,
    pub expenses: usize,
}

/// Deterministic demo dataset covering the three expense workflow outcomes.
/// Loading is idempotent: seed rows are replaced wholesale on every run.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Self::verify(pool).await
    }

    async fn verify(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let companies: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM company WHERE id LIKE 'seed-%'")
                .fetch_one(pool)
                .await?;
        let employees: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM employee WHERE id LIKE 'seed-%'")
                .fetch_one(pool)
                .await?;
        let expenses: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM expense WHERE id LIKE 'seed-%'")
                .fetch_one(pool)
                .await?;

        if companies as usize != SEED_COMPANY_IDS.len()
            || employees as usize != SEED_EMPLOYEE_IDS.len()
            || expenses as usize != SEED_EXPENSE_IDS.len()
        {
            return Err(RepositoryError::Decode(format!(
                "seed verification failed: {companies} companies, {employees} employees, {expenses} expenses"
            )));
        }

        Ok(SeedResult {
            companies: companies as usize,
            employees: employees as usize,
            expenses: expenses as usize,
        })
    }
}
