//! Store decorators shared by the engine's tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::company::{Company, CompanyId, GuildId, Member, MemberId};
use crate::db::models::Invite;
use crate::db::pool::{create_pool, run_migrations};
use crate::db::repository::{MemberRemoval, Repository, SqliteRepository};

/// Wraps the sqlite repository to count store calls and optionally stall
/// them, either before the call reaches the store or after it has completed.
pub(crate) struct CountingRepository {
    inner: SqliteRepository,
    calls: AtomicUsize,
    before: std::sync::Mutex<Option<Duration>>,
    after: std::sync::Mutex<Option<Duration>>,
}

impl CountingRepository {
    pub(crate) fn new(inner: SqliteRepository) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            before: std::sync::Mutex::new(None),
            after: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Delay every call before it touches the store.
    pub(crate) fn stall(&self, delay: Option<Duration>) {
        *self.before.lock().unwrap() = delay;
    }

    /// Let every call complete, then hold back its result.
    pub(crate) fn stall_after(&self, delay: Option<Duration>) {
        *self.after.lock().unwrap() = delay;
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.before.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn leave<T>(&self, result: T) -> T {
        let delay = *self.after.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl Repository for CountingRepository {
    async fn insert_company(&self, company: &Company) -> Result<(), sqlx::Error> {
        self.enter().await;
        let result = self.inner.insert_company(company).await;
        self.leave(result).await
    }

    async fn fetch_company_by_id(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.fetch_company_by_id(company_id).await;
        self.leave(result).await
    }

    async fn fetch_companies_by_guild(
        &self,
        guild_id: GuildId,
    ) -> Result<Vec<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.fetch_companies_by_guild(guild_id).await;
        self.leave(result).await
    }

    async fn fetch_all_companies(&self) -> Result<Vec<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.fetch_all_companies().await;
        self.leave(result).await
    }

    async fn fetch_company_by_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Option<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.fetch_company_by_member(guild_id, member_id).await;
        self.leave(result).await
    }

    async fn merge_company_fields(
        &self,
        companies: &[Company],
    ) -> Result<Vec<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.merge_company_fields(companies).await;
        self.leave(result).await
    }

    async fn delete_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Company>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.delete_company(company_id).await;
        self.leave(result).await
    }

    async fn delete_guild_companies(&self, guild_id: GuildId) -> Result<u64, sqlx::Error> {
        self.enter().await;
        let result = self.inner.delete_guild_companies(guild_id).await;
        self.leave(result).await
    }

    async fn insert_member(
        &self,
        member: &Member,
        invite_code: Option<&str>,
    ) -> Result<Company, sqlx::Error> {
        self.enter().await;
        let result = self.inner.insert_member(member, invite_code).await;
        self.leave(result).await
    }

    async fn delete_member(
        &self,
        company_id: CompanyId,
        member_id: MemberId,
    ) -> Result<MemberRemoval, sqlx::Error> {
        self.enter().await;
        let result = self.inner.delete_member(company_id, member_id).await;
        self.leave(result).await
    }

    async fn swap_leader(
        &self,
        company_id: CompanyId,
        from: MemberId,
        to: MemberId,
    ) -> Result<Company, sqlx::Error> {
        self.enter().await;
        let result = self.inner.swap_leader(company_id, from, to).await;
        self.leave(result).await
    }

    async fn insert_invite(&self, invite: &Invite) -> Result<(), sqlx::Error> {
        self.enter().await;
        let result = self.inner.insert_invite(invite).await;
        self.leave(result).await
    }

    async fn fetch_invite(&self, code: &str) -> Result<Option<Invite>, sqlx::Error> {
        self.enter().await;
        let result = self.inner.fetch_invite(code).await;
        self.leave(result).await
    }

    async fn delete_invite(&self, code: &str) -> Result<bool, sqlx::Error> {
        self.enter().await;
        let result = self.inner.delete_invite(code).await;
        self.leave(result).await
    }
}

/// Counting repository over a fresh in-memory database with migrations applied.
pub(crate) async fn counting_repository() -> Arc<CountingRepository> {
    let pool = create_pool("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(CountingRepository::new(SqliteRepository::new(pool)))
}
