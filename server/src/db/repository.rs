//! Durable store for companies, rosters and invites.
//!
//! Every read returns companies with their roster attached, loaded with one
//! query per table rather than one per company. Every write runs in a single
//! transaction; dropping the future mid-way rolls it back.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::models::{CompanyRow, Invite, MemberRow};
use super::queries::{companies, invites, members};
use crate::engine::company::{Company, CompanyId, GuildId, Member, MemberId, MemberRole};

/// Result of removing a roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRemoval {
    /// The company still has members; its refreshed state.
    Remaining(Company),
    /// The last member left, so the company was deleted. `released` holds the
    /// refreshed state of any company whose war against it was ended.
    Disbanded { released: Vec<Company> },
}

/// Storage operations consumed by the company directory.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a company together with its roster.
    async fn insert_company(&self, company: &Company) -> Result<(), sqlx::Error>;

    async fn fetch_company_by_id(&self, company_id: CompanyId) -> Result<Option<Company>, sqlx::Error>;

    async fn fetch_companies_by_guild(&self, guild_id: GuildId) -> Result<Vec<Company>, sqlx::Error>;

    async fn fetch_all_companies(&self) -> Result<Vec<Company>, sqlx::Error>;

    async fn fetch_company_by_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Option<Company>, sqlx::Error>;

    /// Write the score and war fields of each company onto its stored row, all
    /// in one transaction. Fails with `RowNotFound` if any row is missing.
    /// Returns the stored state afterwards.
    async fn merge_company_fields(&self, companies: &[Company]) -> Result<Vec<Company>, sqlx::Error>;

    /// Delete a company, ending any war fought against it. Returns the
    /// refreshed former opponents.
    async fn delete_company(&self, company_id: CompanyId) -> Result<Vec<Company>, sqlx::Error>;

    async fn delete_guild_companies(&self, guild_id: GuildId) -> Result<u64, sqlx::Error>;

    /// Add a member, consuming `invite_code` in the same transaction when
    /// given. Returns the refreshed company.
    async fn insert_member(
        &self,
        member: &Member,
        invite_code: Option<&str>,
    ) -> Result<Company, sqlx::Error>;

    /// Remove a member; the last one out deletes the company.
    async fn delete_member(
        &self,
        company_id: CompanyId,
        member_id: MemberId,
    ) -> Result<MemberRemoval, sqlx::Error>;

    /// Demote `from` and promote `to` in one transaction.
    async fn swap_leader(
        &self,
        company_id: CompanyId,
        from: MemberId,
        to: MemberId,
    ) -> Result<Company, sqlx::Error>;

    async fn insert_invite(&self, invite: &Invite) -> Result<(), sqlx::Error>;

    async fn fetch_invite(&self, code: &str) -> Result<Option<Invite>, sqlx::Error>;

    async fn delete_invite(&self, code: &str) -> Result<bool, sqlx::Error>;
}

/// SQLite-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Group roster rows under their company rows.
fn assemble(rows: Vec<CompanyRow>, member_rows: Vec<MemberRow>) -> Result<Vec<Company>, sqlx::Error> {
    let mut rosters: HashMap<i64, Vec<MemberRow>> = HashMap::new();
    for m in member_rows {
        rosters.entry(m.company_id).or_default().push(m);
    }
    rows.into_iter()
        .map(|row| {
            let roster = rosters.remove(&row.id).unwrap_or_default();
            row.into_company(roster)
        })
        .collect()
}

async fn load_company(
    conn: &mut SqliteConnection,
    company_id: CompanyId,
) -> Result<Option<Company>, sqlx::Error> {
    let Some(row) = companies::get_company(&mut *conn, company_id).await? else {
        return Ok(None);
    };
    let roster = members::list_company_members(&mut *conn, company_id).await?;
    row.into_company(roster).map(Some)
}

async fn load_existing(conn: &mut SqliteConnection, company_id: CompanyId) -> Result<Company, sqlx::Error> {
    load_company(conn, company_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn insert_company(&self, company: &Company) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        companies::create_company(&mut tx, company).await?;
        for member in &company.members {
            members::add_member(&mut tx, member).await?;
        }
        tx.commit().await?;
        debug!(company_id = company.id, guild_id = company.guild_id, "company inserted");
        Ok(())
    }

    async fn fetch_company_by_id(&self, company_id: CompanyId) -> Result<Option<Company>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        load_company(&mut conn, company_id).await
    }

    async fn fetch_companies_by_guild(&self, guild_id: GuildId) -> Result<Vec<Company>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = companies::list_guild_companies(&mut conn, guild_id).await?;
        let roster = members::list_guild_members(&mut conn, guild_id).await?;
        assemble(rows, roster)
    }

    async fn fetch_all_companies(&self) -> Result<Vec<Company>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let rows = companies::list_all_companies(&mut conn).await?;
        let roster = members::list_all_members(&mut conn).await?;
        assemble(rows, roster)
    }

    async fn fetch_company_by_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Option<Company>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let Some(row) = companies::find_company_by_member(&mut conn, guild_id, member_id).await?
        else {
            return Ok(None);
        };
        let roster = members::list_company_members(&mut conn, row.id).await?;
        row.into_company(roster).map(Some)
    }

    async fn merge_company_fields(&self, updates: &[Company]) -> Result<Vec<Company>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for company in updates {
            if companies::update_war_fields(&mut tx, company).await? == 0 {
                return Err(sqlx::Error::RowNotFound);
            }
        }
        let mut stored = Vec::with_capacity(updates.len());
        for company in updates {
            stored.push(load_existing(&mut tx, company.id).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_company(&self, company_id: CompanyId) -> Result<Vec<Company>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let released = disband(&mut tx, company_id).await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn delete_guild_companies(&self, guild_id: GuildId) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let deleted = companies::delete_guild_companies(&mut tx, guild_id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn insert_member(
        &self,
        member: &Member,
        invite_code: Option<&str>,
    ) -> Result<Company, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if members::add_member(&mut tx, member).await? == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        let company = load_existing(&mut tx, member.company_id).await?;
        if let Some(code) = invite_code {
            if invites::delete_invite(&mut tx, code).await? == 0 {
                return Err(sqlx::Error::RowNotFound);
            }
        }
        invites::delete_member_invites(&mut tx, company.guild_id, member.member_id).await?;
        tx.commit().await?;
        Ok(company)
    }

    async fn delete_member(
        &self,
        company_id: CompanyId,
        member_id: MemberId,
    ) -> Result<MemberRemoval, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if members::remove_member(&mut tx, company_id, member_id).await? == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        let outcome = if members::count_members(&mut tx, company_id).await? == 0 {
            let released = disband(&mut tx, company_id).await?;
            MemberRemoval::Disbanded { released }
        } else {
            MemberRemoval::Remaining(load_existing(&mut tx, company_id).await?)
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn swap_leader(
        &self,
        company_id: CompanyId,
        from: MemberId,
        to: MemberId,
    ) -> Result<Company, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        // Demote first: at most one leader row may exist at any time.
        if members::set_member_role(&mut tx, company_id, from, MemberRole::Private).await? == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        if members::set_member_role(&mut tx, company_id, to, MemberRole::Leader).await? == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        let company = load_existing(&mut tx, company_id).await?;
        tx.commit().await?;
        Ok(company)
    }

    async fn insert_invite(&self, invite: &Invite) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        invites::create_invite(&mut conn, invite).await
    }

    async fn fetch_invite(&self, code: &str) -> Result<Option<Invite>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        invites::get_invite_by_code(&mut conn, code).await
    }

    async fn delete_invite(&self, code: &str) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(invites::delete_invite(&mut conn, code).await? > 0)
    }
}

/// Delete a company inside an open transaction. Opponents win by forfeit:
/// their war ends and their influence is banked.
async fn disband(
    conn: &mut SqliteConnection,
    company_id: CompanyId,
) -> Result<Vec<Company>, sqlx::Error> {
    let opponents = companies::list_opponents_of(&mut *conn, company_id).await?;
    companies::forfeit_wars_against(&mut *conn, company_id).await?;
    if companies::delete_company(&mut *conn, company_id).await? == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    let mut released = Vec::with_capacity(opponents.len());
    for id in opponents {
        released.push(load_existing(&mut *conn, id).await?);
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::engine::company::Visibility;

    async fn setup_repo() -> SqliteRepository {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_fetch_with_roster() {
        let repo = setup_repo().await;
        let company = Company::new(1, 100, "A", Visibility::Public, 10);
        repo.insert_company(&company).await.unwrap();

        let fetched = repo.fetch_company_by_id(1).await.unwrap().unwrap();
        assert_eq!(fetched, company);

        let by_member = repo.fetch_company_by_member(100, 10).await.unwrap().unwrap();
        assert_eq!(by_member.id, 1);
        assert!(repo.fetch_company_by_member(200, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_nothing_behind() {
        let repo = setup_repo().await;
        repo.insert_company(&Company::new(1, 100, "A", Visibility::Public, 10))
            .await
            .unwrap();

        // Founder already serves in company 1: roster insert fails, row rolls back
        let poacher = Company::new(2, 100, "B", Visibility::Public, 10);
        assert!(repo.insert_company(&poacher).await.is_err());
        assert!(repo.fetch_company_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guild_fetch_groups_rosters() {
        let repo = setup_repo().await;
        repo.insert_company(&Company::new(1, 100, "A", Visibility::Public, 10))
            .await
            .unwrap();
        repo.insert_company(&Company::new(2, 100, "B", Visibility::Public, 20))
            .await
            .unwrap();
        repo.insert_member(&Member::new(21, 2, MemberRole::Private), None)
            .await
            .unwrap();

        let guild = repo.fetch_companies_by_guild(100).await.unwrap();
        assert_eq!(guild.len(), 2);
        assert_eq!(guild[0].members.len(), 1);
        assert_eq!(guild[1].members.len(), 2);
        assert_eq!(repo.fetch_all_companies().await.unwrap().len(), 2);

        assert!(repo.delete_company(1).await.unwrap().is_empty());
        assert_eq!(repo.fetch_all_companies().await.unwrap().len(), 1);
        assert_eq!(repo.delete_guild_companies(100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_merge_is_all_or_nothing() {
        let repo = setup_repo().await;
        let mut a = Company::new(1, 100, "A", Visibility::Public, 10);
        repo.insert_company(&a).await.unwrap();

        a.influence = 9;
        let ghost = Company::new(99, 100, "Ghost", Visibility::Public, 90);
        let result = repo.merge_company_fields(&[a.clone(), ghost]).await;
        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));

        let stored = repo.fetch_company_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.influence, 0, "partial merge must roll back");

        let merged = repo.merge_company_fields(&[a]).await.unwrap();
        assert_eq!(merged[0].influence, 9);
    }

    #[tokio::test]
    async fn test_last_member_out_disbands_and_releases_opponent() {
        let repo = setup_repo().await;
        let mut a = Company::new(1, 100, "A", Visibility::Public, 10);
        let mut b = Company::new(2, 100, "B", Visibility::Public, 20);
        repo.insert_company(&a).await.unwrap();
        repo.insert_company(&b).await.unwrap();

        let expires = chrono::Utc::now();
        a.begin_war(2, expires);
        b.begin_war(1, expires);
        b.influence = 6;
        repo.merge_company_fields(&[a, b]).await.unwrap();

        let outcome = repo.delete_member(1, 10).await.unwrap();
        let MemberRemoval::Disbanded { released } = outcome else {
            panic!("expected disband, got {outcome:?}");
        };
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, 2);
        assert!(!released[0].at_war);
        assert_eq!(released[0].total_influence, 6);

        assert!(repo.fetch_company_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_swap_leader_and_invites() {
        let repo = setup_repo().await;
        repo.insert_company(&Company::new(1, 100, "A", Visibility::Private, 10))
            .await
            .unwrap();

        let invite = Invite {
            code: "c1".into(),
            guild_id: 100,
            company_id: 1,
            member_id: 11,
            invited_by: 10,
            created_at: chrono::Utc::now(),
        };
        repo.insert_invite(&invite).await.unwrap();
        let fetched = repo.fetch_invite("c1").await.unwrap().unwrap();
        assert_eq!((fetched.company_id, fetched.member_id), (1, 11));

        repo.insert_member(&Member::new(11, 1, MemberRole::Private), Some("c1"))
            .await
            .unwrap();
        assert!(repo.fetch_invite("c1").await.unwrap().is_none());

        let company = repo.swap_leader(1, 10, 11).await.unwrap();
        assert_eq!(company.leader().map(|m| m.member_id), Some(11));
        assert!(!company.is_leader(10));

        assert!(matches!(
            repo.swap_leader(1, 10, 99).await,
            Err(sqlx::Error::RowNotFound)
        ));
        // Failed swap rolled back
        let company = repo.fetch_company_by_id(1).await.unwrap().unwrap();
        assert_eq!(company.leader().map(|m| m.member_id), Some(11));
    }
}
