use sqlx::SqliteConnection;

use crate::db::models::MemberRow;
use crate::engine::company::{Member, MemberRole};

/// Add a member to a company, taking the guild from the company row.
/// Returns rows affected (0 when the company does not exist).
pub async fn add_member(conn: &mut SqliteConnection, member: &Member) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO member (member_id, guild_id, company_id, role) \
         SELECT ?, guild_id, id, ? FROM company WHERE id = ?",
    )
    .bind(member.member_id)
    .bind(member.role.as_str())
    .bind(member.company_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Remove a member from a company. Returns rows affected.
pub async fn remove_member(
    conn: &mut SqliteConnection,
    company_id: i64,
    member_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM member WHERE company_id = ? AND member_id = ?")
        .bind(company_id)
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Change a member's role. Returns rows affected.
pub async fn set_member_role(
    conn: &mut SqliteConnection,
    company_id: i64,
    member_id: i64,
    role: MemberRole,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE member SET role = ? WHERE company_id = ? AND member_id = ?")
        .bind(role.as_str())
        .bind(company_id)
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Roster of one company.
pub async fn list_company_members(
    conn: &mut SqliteConnection,
    company_id: i64,
) -> Result<Vec<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>("SELECT * FROM member WHERE company_id = ? ORDER BY id")
        .bind(company_id)
        .fetch_all(conn)
        .await
}

/// Rosters of every company in a guild, in one query.
pub async fn list_guild_members(
    conn: &mut SqliteConnection,
    guild_id: i64,
) -> Result<Vec<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>("SELECT * FROM member WHERE guild_id = ? ORDER BY id")
        .bind(guild_id)
        .fetch_all(conn)
        .await
}

/// Every roster entry.
pub async fn list_all_members(conn: &mut SqliteConnection) -> Result<Vec<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>("SELECT * FROM member ORDER BY id")
        .fetch_all(conn)
        .await
}

/// Number of members left in a company.
pub async fn count_members(conn: &mut SqliteConnection, company_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE company_id = ?")
        .bind(company_id)
        .fetch_one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::companies;
    use crate::engine::company::{Company, Visibility};
    use sqlx::SqlitePool;

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn setup_company(conn: &mut SqliteConnection, id: i64, guild_id: i64, leader: i64) {
        let company = Company::new(id, guild_id, format!("C{id}"), Visibility::Public, leader);
        companies::create_company(conn, &company).await.unwrap();
        add_member(conn, &company.members[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_remove_member() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        setup_company(&mut conn, 1, 100, 10).await;

        let added = add_member(&mut conn, &Member::new(11, 1, MemberRole::Private))
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(count_members(&mut conn, 1).await.unwrap(), 2);

        let rows = list_company_members(&mut conn, 1).await.unwrap();
        assert_eq!(rows[1].member_id, 11);
        assert_eq!(rows[1].guild_id, 100);
        assert_eq!(rows[1].role, "Private");

        assert_eq!(remove_member(&mut conn, 1, 11).await.unwrap(), 1);
        assert_eq!(remove_member(&mut conn, 1, 11).await.unwrap(), 0);
        assert_eq!(count_members(&mut conn, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_member_to_missing_company() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let added = add_member(&mut conn, &Member::new(11, 99, MemberRole::Private))
            .await
            .unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn test_one_company_per_member_per_guild() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        setup_company(&mut conn, 1, 100, 10).await;
        setup_company(&mut conn, 2, 100, 20).await;
        setup_company(&mut conn, 3, 200, 30).await;

        add_member(&mut conn, &Member::new(11, 1, MemberRole::Private))
            .await
            .unwrap();
        let second = add_member(&mut conn, &Member::new(11, 2, MemberRole::Private)).await;
        assert!(second.is_err(), "unique index should reject a second company");

        // A different guild is a different scope
        add_member(&mut conn, &Member::new(11, 3, MemberRole::Private))
            .await
            .unwrap();
        assert_eq!(list_guild_members(&mut conn, 100).await.unwrap().len(), 3);
        assert_eq!(list_all_members(&mut conn).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_single_leader_index() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        setup_company(&mut conn, 1, 100, 10).await;
        add_member(&mut conn, &Member::new(11, 1, MemberRole::Private))
            .await
            .unwrap();

        let promoted = set_member_role(&mut conn, 1, 11, MemberRole::Leader).await;
        assert!(promoted.is_err(), "two leaders must be rejected");

        set_member_role(&mut conn, 1, 10, MemberRole::Private)
            .await
            .unwrap();
        assert_eq!(
            set_member_role(&mut conn, 1, 11, MemberRole::Leader)
                .await
                .unwrap(),
            1
        );
    }
}
