use sqlx::SqliteConnection;

use crate::db::models::Invite;

pub async fn create_invite(conn: &mut SqliteConnection, invite: &Invite) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO company_invite (code, guild_id, company_id, member_id, invited_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&invite.code)
    .bind(invite.guild_id)
    .bind(invite.company_id)
    .bind(invite.member_id)
    .bind(invite.invited_by)
    .bind(invite.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_invite_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Invite>, sqlx::Error> {
    sqlx::query_as::<_, Invite>("SELECT * FROM company_invite WHERE code = ?")
        .bind(code)
        .fetch_optional(conn)
        .await
}

pub async fn list_member_invites(
    conn: &mut SqliteConnection,
    guild_id: i64,
    member_id: i64,
) -> Result<Vec<Invite>, sqlx::Error> {
    sqlx::query_as::<_, Invite>(
        "SELECT * FROM company_invite WHERE guild_id = ? AND member_id = ? ORDER BY created_at DESC",
    )
    .bind(guild_id)
    .bind(member_id)
    .fetch_all(conn)
    .await
}

pub async fn delete_invite(conn: &mut SqliteConnection, code: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM company_invite WHERE code = ?")
        .bind(code)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Drop every other pending invite for a member once they have joined somewhere.
pub async fn delete_member_invites(
    conn: &mut SqliteConnection,
    guild_id: i64,
    member_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM company_invite WHERE guild_id = ? AND member_id = ?")
        .bind(guild_id)
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::SqlitePool;

    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::companies;
    use crate::engine::company::{Company, Visibility};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn invite(code: &str, company_id: i64, member_id: i64) -> Invite {
        Invite {
            code: code.into(),
            guild_id: 100,
            company_id,
            member_id,
            invited_by: 10,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_invite() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        companies::create_company(&mut conn, &Company::new(1, 100, "A", Visibility::Private, 10))
            .await
            .unwrap();

        let inv = invite("abc", 1, 55);
        create_invite(&mut conn, &inv).await.unwrap();

        let fetched = get_invite_by_code(&mut conn, "abc").await.unwrap().unwrap();
        assert_eq!(fetched.company_id, 1);
        assert_eq!(fetched.member_id, 55);
        assert_eq!(fetched.invited_by, 10);

        assert!(get_invite_by_code(&mut conn, "nope").await.unwrap().is_none());
        assert_eq!(delete_invite(&mut conn, "abc").await.unwrap(), 1);
        assert!(get_invite_by_code(&mut conn, "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_invites_and_cascade() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        companies::create_company(&mut conn, &Company::new(1, 100, "A", Visibility::Private, 10))
            .await
            .unwrap();
        companies::create_company(&mut conn, &Company::new(2, 100, "B", Visibility::Private, 20))
            .await
            .unwrap();

        create_invite(&mut conn, &invite("x1", 1, 55)).await.unwrap();
        create_invite(&mut conn, &invite("x2", 2, 55)).await.unwrap();
        assert_eq!(list_member_invites(&mut conn, 100, 55).await.unwrap().len(), 2);

        // Deleting a company takes its invites with it
        companies::delete_company(&mut conn, 1).await.unwrap();
        assert_eq!(list_member_invites(&mut conn, 100, 55).await.unwrap().len(), 1);

        assert_eq!(delete_member_invites(&mut conn, 100, 55).await.unwrap(), 1);
        assert!(list_member_invites(&mut conn, 100, 55).await.unwrap().is_empty());
    }
}
