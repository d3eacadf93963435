use serde::Serialize;

use super::company::{Company, CompanyId};

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCompany {
    pub rank: u32,
    pub company_id: CompanyId,
    pub name: String,
    pub total_influence: i64,
}

/// Rank companies by lifetime influence, highest first. Equal totals share a
/// rank and the next distinct total takes the following number (1, 1, 2).
/// Ties keep their input order.
pub fn rank_companies(companies: &[Company]) -> Vec<RankedCompany> {
    let mut sorted: Vec<&Company> = companies.iter().collect();
    sorted.sort_by(|a, b| b.total_influence.cmp(&a.total_influence));

    let mut ranked = Vec::with_capacity(sorted.len());
    let mut rank = 0;
    let mut last_total = None;

    for company in sorted {
        if last_total != Some(company.total_influence) {
            rank += 1;
            last_total = Some(company.total_influence);
        }
        ranked.push(RankedCompany {
            rank,
            company_id: company.id,
            name: company.name.clone(),
            total_influence: company.total_influence,
        });
    }

    ranked
}
