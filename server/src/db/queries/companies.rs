use sqlx::SqliteConnection;

use crate::db::models::CompanyRow;
use crate::engine::company::Company;

/// Insert a company row. The roster is inserted separately.
pub async fn create_company(conn: &mut SqliteConnection, company: &Company) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO company \
         (id, guild_id, name, visibility, influence, total_influence, at_war, war_expires_at, opponent_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(company.id)
    .bind(company.guild_id)
    .bind(&company.name)
    .bind(company.visibility.as_str())
    .bind(company.influence)
    .bind(company.total_influence)
    .bind(company.at_war)
    .bind(company.war_expires_at)
    .bind(company.opponent_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Get a company by ID.
pub async fn get_company(
    conn: &mut SqliteConnection,
    company_id: i64,
) -> Result<Option<CompanyRow>, sqlx::Error> {
    sqlx::query_as::<_, CompanyRow>("SELECT * FROM company WHERE id = ?")
        .bind(company_id)
        .fetch_optional(conn)
        .await
}

/// List a guild's companies.
pub async fn list_guild_companies(
    conn: &mut SqliteConnection,
    guild_id: i64,
) -> Result<Vec<CompanyRow>, sqlx::Error> {
    sqlx::query_as::<_, CompanyRow>("SELECT * FROM company WHERE guild_id = ? ORDER BY id")
        .bind(guild_id)
        .fetch_all(conn)
        .await
}

/// List every company (startup cache fill).
pub async fn list_all_companies(conn: &mut SqliteConnection) -> Result<Vec<CompanyRow>, sqlx::Error> {
    sqlx::query_as::<_, CompanyRow>("SELECT * FROM company ORDER BY guild_id, id")
        .fetch_all(conn)
        .await
}

/// Find the company a member serves in within a guild.
pub async fn find_company_by_member(
    conn: &mut SqliteConnection,
    guild_id: i64,
    member_id: i64,
) -> Result<Option<CompanyRow>, sqlx::Error> {
    sqlx::query_as::<_, CompanyRow>(
        "SELECT c.* FROM company c \
         JOIN member m ON m.company_id = c.id \
         WHERE c.guild_id = ? AND m.member_id = ?",
    )
    .bind(guild_id)
    .bind(member_id)
    .fetch_optional(conn)
    .await
}

/// Overwrite the score and war fields of a company. Returns rows affected.
pub async fn update_war_fields(
    conn: &mut SqliteConnection,
    company: &Company,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE company SET influence = ?, total_influence = ?, at_war = ?, \
         war_expires_at = ?, opponent_id = ? WHERE id = ?",
    )
    .bind(company.influence)
    .bind(company.total_influence)
    .bind(company.at_war)
    .bind(company.war_expires_at)
    .bind(company.opponent_id)
    .bind(company.id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// IDs of companies whose opponent is `company_id`.
pub async fn list_opponents_of(
    conn: &mut SqliteConnection,
    company_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM company WHERE opponent_id = ? ORDER BY id")
        .bind(company_id)
        .fetch_all(conn)
        .await
}

/// End the war of every company fighting `company_id`, banking their influence.
pub async fn forfeit_wars_against(
    conn: &mut SqliteConnection,
    company_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE company SET total_influence = total_influence + influence, influence = 0, \
         at_war = 0, war_expires_at = NULL, opponent_id = NULL WHERE opponent_id = ?",
    )
    .bind(company_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Delete a company. Members and invites cascade.
pub async fn delete_company(conn: &mut SqliteConnection, company_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM company WHERE id = ?")
        .bind(company_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every company in a guild. Returns how many were removed.
pub async fn delete_guild_companies(
    conn: &mut SqliteConnection,
    guild_id: i64,
) -> Result<u64, sqlx::Error> {
    // Break opponent links first so no row references a deleted one.
    sqlx::query("UPDATE company SET opponent_id = NULL WHERE guild_id = ?")
        .bind(guild_id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM company WHERE guild_id = ?")
        .bind(guild_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
