use crate::conversion::SourceCategory;
use crate::format::{self, MONTH_ABBREVIATIONS};
use crate::gateway::Backend;
use crate::models::{Emission, EmissionSource, EntityId, Transaction, TransactionKind, User};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

pub const TREND_MONTHS: u32 = 6;
pub const RECENT_ACTIVITY_LIMIT: usize = 4;

pub type SourceIndex<'a> = HashMap<EntityId, &'a EmissionSource>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub energy: f64,
    pub fleet: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyTrend {
    /// "YYYY-MM", oldest first.
    pub keys: Vec<String>,
    pub labels: Vec<String>,
    pub totals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub date: String,
    #[serde(skip)]
    pub when: Option<NaiveDateTime>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub energy_emissions: f64,
    pub fleet_emissions: f64,
    pub available_tokens: i64,
    pub compensated_emissions: f64,
    pub monthly_trend: Vec<f64>,
    pub monthly_labels: Vec<String>,
    pub recent_activities: Vec<Activity>,
}

pub fn index_sources(sources: &[EmissionSource]) -> SourceIndex<'_> {
    sources
        .iter()
        .filter_map(|source| source.id.clone().map(|id| (id, source)))
        .collect()
}

pub fn emissions_of<'a>(user_id: &EntityId, emissions: &'a [Emission]) -> Vec<&'a Emission> {
    emissions
        .iter()
        .filter(|emission| emission.user_id.as_ref() == Some(user_id))
        .collect()
}

pub fn transactions_of<'a>(user_id: &EntityId, transactions: &'a [Transaction]) -> Vec<&'a Transaction> {
    transactions
        .iter()
        .filter(|transaction| transaction.user_id.as_ref() == Some(user_id))
        .collect()
}

pub fn source_of<'a>(emission: &Emission, sources: &SourceIndex<'a>) -> Option<&'a EmissionSource> {
    emission.source_id.as_ref().and_then(|id| sources.get(id).copied())
}

/// Emissions whose source is unknown, or of neither category, count nowhere.
pub fn category_totals(emissions: &[&Emission], sources: &SourceIndex<'_>) -> CategoryTotals {
    let mut totals = CategoryTotals::default();
    for emission in emissions {
        let Some(source) = source_of(emission, sources) else {
            continue;
        };
        match SourceCategory::from_source_type(&source.source_type) {
            Some(SourceCategory::Energy) => totals.energy += emission.co2_kg,
            Some(SourceCategory::Fleet) => totals.fleet += emission.co2_kg,
            None => {}
        }
    }
    totals
}

pub fn compensated_total(transactions: &[&Transaction]) -> f64 {
    transactions
        .iter()
        .filter(|transaction| transaction.kind == TransactionKind::Compensacao)
        .map(|transaction| transaction.co2_kg)
        .sum()
}

pub fn monthly_trend_at(today: NaiveDate, emissions: &[&Emission]) -> MonthlyTrend {
    let mut keys = Vec::with_capacity(TREND_MONTHS as usize);
    let mut labels = Vec::with_capacity(TREND_MONTHS as usize);
    for offset in (0..TREND_MONTHS).rev() {
        let (year, month) = months_back(today.year(), today.month(), offset);
        keys.push(month_key(year, month));
        labels.push(MONTH_ABBREVIATIONS[(month - 1) as usize].to_string());
    }

    let mut totals = vec![0.0; keys.len()];
    for emission in emissions {
        let Some(stamp) = format::parse_timestamp(&emission.recorded_at) else {
            continue;
        };
        let key = month_key(stamp.year(), stamp.month());
        if let Some(slot) = keys.iter().position(|candidate| *candidate == key) {
            totals[slot] += emission.co2_kg;
        }
    }

    MonthlyTrend { keys, labels, totals }
}

pub fn recent_activity_at(
    now: NaiveDateTime,
    transactions: &[&Transaction],
    emissions: &[&Emission],
    sources: &SourceIndex<'_>,
) -> Vec<Activity> {
    let stamp_or_now = |raw: &str| -> (String, Option<NaiveDateTime>) {
        if raw.trim().is_empty() {
            (now.format("%Y-%m-%dT%H:%M:%S").to_string(), Some(now))
        } else {
            (raw.to_string(), format::parse_timestamp(raw))
        }
    };

    let mut activities = Vec::new();
    for transaction in transactions {
        let (kind, description) = match transaction.kind {
            TransactionKind::Compra => ("Tokenização", "Compra de Tokens de Projeto"),
            TransactionKind::Venda => ("Tokenização", "Emissão de Tokens"),
            TransactionKind::Compensacao => ("Compensação", "Compensação de Carbono"),
            TransactionKind::Other => continue,
        };
        let (date, when) = stamp_or_now(&transaction.occurred_at);
        activities.push(Activity {
            date,
            when,
            kind,
            description: description.to_string(),
            value: format!("{} kg CO₂", format::number(transaction.co2_kg)),
        });
    }

    for emission in emissions {
        let source_type = source_of(emission, sources)
            .map(|source| source.source_type.as_str())
            .unwrap_or("Desconhecido");
        let (date, when) = stamp_or_now(&emission.recorded_at);
        activities.push(Activity {
            date,
            when,
            kind: "Emissão",
            description: format!("Registro de Emissão de {source_type}"),
            value: format!("{} kg CO₂", format::number(emission.co2_kg)),
        });
    }

    activities.sort_by(|a, b| b.when.cmp(&a.when));
    activities.truncate(RECENT_ACTIVITY_LIMIT);
    activities
}

pub fn build_dashboard(
    user_id: &EntityId,
    user: Option<&User>,
    emissions: &[Emission],
    sources: &[EmissionSource],
    transactions: &[Transaction],
) -> DashboardStats {
    build_dashboard_at(Local::now().naive_local(), user_id, user, emissions, sources, transactions)
}

pub fn build_dashboard_at(
    now: NaiveDateTime,
    user_id: &EntityId,
    user: Option<&User>,
    emissions: &[Emission],
    sources: &[EmissionSource],
    transactions: &[Transaction],
) -> DashboardStats {
    let sources = index_sources(sources);
    let emissions = emissions_of(user_id, emissions);
    let transactions = transactions_of(user_id, transactions);

    let totals = category_totals(&emissions, &sources);
    let trend = monthly_trend_at(now.date(), &emissions);

    DashboardStats {
        energy_emissions: totals.energy,
        fleet_emissions: totals.fleet,
        available_tokens: user.map(|user| user.token_balance).unwrap_or(0),
        compensated_emissions: compensated_total(&transactions),
        monthly_trend: trend.totals,
        monthly_labels: trend.labels,
        recent_activities: recent_activity_at(now, &transactions, &emissions, &sources),
    }
}

/// Fetches the four collections concurrently. Each failed fetch is logged and
/// read as empty; a failed user fetch reads as a zero balance.
pub async fn load_dashboard(backend: &Backend, user_id: &EntityId) -> DashboardStats {
    let (user, emissions, sources, transactions) = tokio::join!(
        backend.get_user(user_id),
        backend.list_emissions(),
        backend.list_sources(),
        backend.list_transactions(),
    );
    let user = user
        .map_err(|err| warn!("failed to load user {user_id}: {err}"))
        .ok();
    let emissions = emissions.unwrap_or_else(|err| {
        warn!("failed to load emissions: {err}");
        Vec::new()
    });
    let sources = sources.unwrap_or_else(|err| {
        warn!("failed to load emission sources: {err}");
        Vec::new()
    });
    let transactions = transactions.unwrap_or_else(|err| {
        warn!("failed to load transactions: {err}");
        Vec::new()
    });
    build_dashboard(user_id, user.as_ref(), &emissions, &sources, &transactions)
}

fn months_back(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}
