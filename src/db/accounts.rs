//! Account queries: lookup by id, telegram id and referral code; creation
//! with the starter kit; the full aggregate snapshot.

use anyhow::Result;

use super::{Account, AccountWithRelated, Backend, Database, NewAccount, StarterKit};

pub(super) const ACCOUNT_COLUMNS: &str = "id, username, telegram_id, display_name, avatar_url,
    points, energy, max_energy, level, tap_bonus, referral_code, referred_by,
    referral_count, wallet_address, last_seen, created_at";

impl Database {
    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger.tables().accounts.get(&id).cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Account>(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }

    pub async fn get_account_by_telegram_id(&self, telegram_id: &str) -> Result<Option<Account>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger
                .tables()
                .accounts
                .values()
                .find(|a| a.telegram_id == telegram_id)
                .cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Account>(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE telegram_id = $1"
                ))
                .bind(telegram_id)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }

    pub async fn get_account_by_referral_code(&self, code: &str) -> Result<Option<Account>> {
        match &self.backend {
            Backend::Memory(ledger) => Ok(ledger
                .tables()
                .accounts
                .values()
                .find(|a| a.referral_code == code)
                .cloned()),
            Backend::Postgres(pool) => {
                let row = sqlx::query_as::<_, Account>(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE referral_code = $1"
                ))
                .bind(code)
                .fetch_optional(pool)
                .await?;
                Ok(row)
            }
        }
    }

    /// Insert a new account together with its stats row and starter kit.
    pub async fn create_account(&self, new: NewAccount, kit: &StarterKit) -> Result<Account> {
        match &self.backend {
            Backend::Memory(ledger) => ledger.create_account(new, kit),
            Backend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let account = sqlx::query_as::<_, Account>(&format!(
                    "INSERT INTO accounts (username, telegram_id, display_name, avatar_url,
                        points, energy, max_energy, level, tap_bonus, referral_code,
                        referred_by, referral_count, last_seen, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 0, $8, $9, 0, $10, $10)
                     RETURNING {ACCOUNT_COLUMNS}"
                ))
                .bind(&new.username)
                .bind(&new.telegram_id)
                .bind(&new.display_name)
                .bind(&new.avatar_url)
                .bind(new.points)
                .bind(new.energy)
                .bind(new.max_energy)
                .bind(&new.referral_code)
                .bind(&new.referred_by)
                .bind(new.now)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query("INSERT INTO stats (user_id) VALUES ($1)")
                    .bind(account.id)
                    .execute(&mut *tx)
                    .await?;
                for seed in &kit.generators {
                    super::generators::insert_generator_pg(&mut tx, account.id, seed).await?;
                }
                for seed in &kit.tasks {
                    super::tasks::insert_task_pg(&mut tx, account.id, seed).await?;
                }
                tx.commit().await?;
                Ok(account)
            }
        }
    }

    /// Load an account and everything it owns. Creates a missing stats row.
    pub async fn get_account_with_related(&self, id: i64) -> Result<Option<AccountWithRelated>> {
        let Some(account) = self.get_account(id).await? else {
            return Ok(None);
        };
        let generators = self.get_generators(id).await?;
        let active_boosts = self.get_active_boosts(id).await?;
        let tasks = self.get_tasks(id).await?;
        let stats = self.get_or_create_stats(id).await?;
        Ok(Some(AccountWithRelated {
            account,
            generators,
            active_boosts,
            tasks,
            stats,
        }))
    }
}
