//! Retiring emissions against project token pools.

use crate::conversion::{self, Rounding};
use crate::errors::ApiError;
use crate::format;
use crate::gateway::Backend;
use crate::models::{
    Emission, EmissionSource, EntityId, NewTransaction, Project, ProjectUpdate, Transaction, TransactionKind,
    UserUpdate,
};
use crate::stats::{emissions_of, index_sources, source_of};
use chrono::{Datelike, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// R$ per token used to price compensation history.
pub const TOKEN_PRICE: Decimal = Decimal::from_parts(4550, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Spend tokens already held by the user.
    Tokens,
    /// Card purchase of new tokens.
    Purchase,
    Crypto,
    Pix,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "tokens" => Some(Self::Tokens),
            "purchase" => Some(Self::Purchase),
            "crypto" => Some(Self::Crypto),
            "pix" => Some(Self::Pix),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Tokens => "Usar Tokens Existentes",
            Self::Purchase => "Comprar Novos Tokens",
            Self::Crypto => "Pagamento em Cripto",
            Self::Pix => "PIX",
        }
    }
}

pub const PAYMENT_METHODS: [PaymentMethod; 4] = [
    PaymentMethod::Tokens,
    PaymentMethod::Purchase,
    PaymentMethod::Crypto,
    PaymentMethod::Pix,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompensationStep {
    Idle,
    ProjectSelected,
    EmissionSelected,
    PaymentMethodSelected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedEmission {
    pub id: EntityId,
    pub co2_kg: f64,
}

/// Selections made in the compensation form, in any order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensationDraft {
    pub project_id: Option<EntityId>,
    pub emission: Option<SelectedEmission>,
    pub payment: Option<PaymentMethod>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCompensation {
    pub project_id: EntityId,
    pub emission: SelectedEmission,
    pub payment: PaymentMethod,
    pub tokens_needed: i64,
}

impl CompensationDraft {
    pub fn select_project(&mut self, id: EntityId) {
        self.project_id = Some(id);
    }

    /// Returns the tokens the emission will consume.
    pub fn select_emission(&mut self, id: EntityId, co2_kg: f64) -> i64 {
        self.emission = Some(SelectedEmission { id, co2_kg });
        conversion::kg_to_tokens(co2_kg, Rounding::Ceil)
    }

    pub fn select_payment(&mut self, method: PaymentMethod) {
        self.payment = Some(method);
    }

    pub fn tokens_needed(&self) -> Option<i64> {
        self.emission
            .as_ref()
            .map(|emission| conversion::kg_to_tokens(emission.co2_kg, Rounding::Ceil))
    }

    pub fn step(&self) -> CompensationStep {
        match (&self.project_id, &self.emission, &self.payment) {
            (Some(_), Some(_), Some(_)) => CompensationStep::PaymentMethodSelected,
            (Some(_), Some(_), None) => CompensationStep::EmissionSelected,
            (Some(_), None, _) => CompensationStep::ProjectSelected,
            (None, _, _) => CompensationStep::Idle,
        }
    }

    pub fn ready(&self) -> Result<ReadyCompensation, ApiError> {
        let project_id = self
            .project_id
            .clone()
            .ok_or_else(|| ApiError::validation("Selecione um projeto."))?;
        let emission = self
            .emission
            .clone()
            .ok_or_else(|| ApiError::validation("Selecione uma emissão para compensar."))?;
        let payment = self
            .payment
            .ok_or_else(|| ApiError::validation("Selecione um método de pagamento."))?;
        let tokens_needed = conversion::kg_to_tokens(emission.co2_kg, Rounding::Ceil);
        Ok(ReadyCompensation {
            project_id,
            emission,
            payment,
            tokens_needed,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompensationForm {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub emission_id: String,
    #[serde(default)]
    pub payment_method: String,
}

impl CompensationForm {
    /// Presence checks, in the order the form reports them.
    pub fn validate(&self) -> Result<(EntityId, EntityId, PaymentMethod), ApiError> {
        let project_id = EntityId::new(self.project_id.as_str())
            .ok_or_else(|| ApiError::validation("Selecione um projeto."))?;
        let emission_id = EntityId::new(self.emission_id.as_str())
            .ok_or_else(|| ApiError::validation("Selecione uma emissão para compensar."))?;
        let payment = PaymentMethod::parse(&self.payment_method)
            .ok_or_else(|| ApiError::validation("Selecione um método de pagamento."))?;
        Ok((project_id, emission_id, payment))
    }

    /// Fills a draft from the form, resolving the emission's quantity from the
    /// user's own emissions.
    pub fn draft(&self, user_id: &EntityId, emissions: &[Emission]) -> Result<CompensationDraft, ApiError> {
        let (project_id, emission_id, payment) = self.validate()?;
        let co2_kg = emissions_of(user_id, emissions)
            .into_iter()
            .find(|emission| emission.id.as_ref() == Some(&emission_id))
            .map(|emission| emission.co2_kg)
            .ok_or_else(|| ApiError::validation("Selecione uma emissão para compensar."))?;

        let mut draft = CompensationDraft::default();
        draft.select_project(project_id);
        draft.select_emission(emission_id, co2_kg);
        draft.select_payment(payment);
        Ok(draft)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationReceipt {
    pub project_name: String,
    pub co2_kg: f64,
    pub tokens: i64,
    pub payment: PaymentMethod,
}

/// Runs a ready compensation against the backend.
///
/// The ledger write, the user debit and the project credit are three separate
/// requests. Once the transaction is posted nothing is rolled back: a later
/// failure comes back as [`ApiError::Incomplete`] naming the step.
pub async fn submit(
    backend: &Backend,
    user_id: &EntityId,
    compensation: &ReadyCompensation,
) -> Result<CompensationReceipt, ApiError> {
    let needed = compensation.tokens_needed;
    let user = backend.get_user(user_id).await?;
    if compensation.payment == PaymentMethod::Tokens && needed > user.token_balance {
        return Err(ApiError::InsufficientTokens {
            available: user.token_balance,
            needed,
        });
    }

    let project = backend.get_project(&compensation.project_id).await?;

    let transaction = NewTransaction {
        project_id: compensation.project_id.clone(),
        user_id: user_id.clone(),
        emission_id: Some(compensation.emission.id.clone()),
        co2_kg: compensation.emission.co2_kg,
        occurred_at: format::iso_now(),
        kind: TransactionKind::Compensacao,
    };
    backend.create_transaction(&transaction).await?;

    if compensation.payment == PaymentMethod::Tokens {
        let update = UserUpdate {
            token_balance: Some(user.token_balance - needed),
            ..UserUpdate::default()
        };
        if let Err(err) = backend.update_user(user_id, &update).await {
            error!("compensation recorded but debiting user {user_id} failed: {err}");
            return Err(ApiError::incomplete("debitar tokens do usuário", err));
        }
    }

    let update = ProjectUpdate {
        token_balance: Some(project.token_balance + needed),
        ..ProjectUpdate::default()
    };
    if let Err(err) = backend.update_project(&compensation.project_id, &update).await {
        error!(
            "compensation recorded but crediting project {} failed: {err}",
            compensation.project_id
        );
        return Err(ApiError::incomplete("creditar tokens do projeto", err));
    }

    info!(
        "user {user_id} compensated {} kg CO2 ({needed} tokens, {:?}) with project {}",
        compensation.emission.co2_kg, compensation.payment, compensation.project_id
    );
    Ok(CompensationReceipt {
        project_name: project.name,
        co2_kg: compensation.emission.co2_kg,
        tokens: needed,
        payment: compensation.payment,
    })
}

/// Form entry point: presence checks, then the emission lookup, then [`submit`].
pub async fn compensate(
    backend: &Backend,
    user_id: &EntityId,
    form: &CompensationForm,
) -> Result<CompensationReceipt, ApiError> {
    form.validate()?;
    let emissions = backend.list_emissions().await?;
    let ready = form.draft(user_id, &emissions)?.ready()?;
    submit(backend, user_id, &ready).await
}

pub fn project_type_name(kind: &str) -> &str {
    match kind {
        "solar" => "Energia Solar",
        "eolica" | "wind" => "Energia Eólica",
        "reflorestamento" | "reforestation" => "Reflorestamento",
        "eficiencia" | "efficiency" => "Eficiência Energética",
        other => other,
    }
}

/// Per-token yield shown on project cards.
pub fn project_impact(kind: &str) -> &'static str {
    match kind {
        "reflorestamento" => "1000 kg CO₂ por token | 10 árvores plantadas",
        "eolica" => "1000 kg CO₂ por token | 250 kWh de energia limpa",
        "eficiencia" => "800 kg CO₂ por token | 15% de eficiência",
        "solar" => "1000 kg CO₂ por token | 500 kWh de energia solar",
        _ => "1000 kg CO₂ por token",
    }
}

pub fn impact_description(kind: &str, tokens: i64) -> String {
    match kind {
        "solar" => format!("{} kWh de energia solar gerada", tokens * 500),
        "eolica" | "wind" => format!("{} kWh de energia eólica gerada", tokens * 250),
        "reflorestamento" | "reforestation" => format!("{} árvores plantadas", tokens * 10),
        "eficiencia" | "efficiency" => format!("Eficiência energética em {} empresas", tokens * 2),
        _ => "Impacto positivo no meio ambiente".to_string(),
    }
}

pub fn certificate_id(year: i32, sequence: usize) -> String {
    format!("CER-{year}-{sequence:03}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompensationRecord {
    pub id: Option<EntityId>,
    pub date: String,
    pub project: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tokens: i64,
    pub emissions: f64,
    pub cost: Decimal,
    pub certificate: String,
    pub impact: String,
}

pub fn history(user_id: &EntityId, transactions: &[Transaction], projects: &[Project]) -> Vec<CompensationRecord> {
    let projects: HashMap<&EntityId, &Project> = projects
        .iter()
        .filter_map(|project| project.id.as_ref().map(|id| (id, project)))
        .collect();
    let now = Local::now();

    transactions
        .iter()
        .filter(|transaction| {
            transaction.user_id.as_ref() == Some(user_id) && transaction.kind == TransactionKind::Compensacao
        })
        .enumerate()
        .map(|(index, transaction)| {
            let project = transaction.project_id.as_ref().and_then(|id| projects.get(id));
            let kind = project
                .map(|project| project.kind.clone())
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(|| "desconhecido".to_string());
            let tokens = conversion::kg_to_tokens(transaction.co2_kg, Rounding::Ceil);
            let stamp = format::parse_timestamp(&transaction.occurred_at);
            let year = stamp.map(|stamp| stamp.year()).unwrap_or_else(|| now.year());
            let date = if transaction.occurred_at.trim().is_empty() {
                format::iso_now()
            } else {
                transaction.occurred_at.clone()
            };

            CompensationRecord {
                id: transaction.id.clone(),
                date,
                project: project
                    .map(|project| project.name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| "Projeto".to_string()),
                impact: impact_description(&kind, tokens),
                kind,
                tokens,
                emissions: transaction.co2_kg,
                cost: TOKEN_PRICE * Decimal::from(tokens),
                certificate: certificate_id(year, index + 1),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationTotals {
    pub compensated_kg: f64,
    pub tokens: i64,
    pub cost: Decimal,
    pub trees_equivalent: i64,
    pub clean_energy_kwh: f64,
}

pub fn totals(records: &[CompensationRecord]) -> CompensationTotals {
    let compensated_kg: f64 = records.iter().map(|record| record.emissions).sum();
    CompensationTotals {
        compensated_kg,
        tokens: records.iter().map(|record| record.tokens).sum(),
        cost: records.iter().map(|record| record.cost).sum(),
        trees_equivalent: (compensated_kg / 28.5).round() as i64,
        clean_energy_kwh: compensated_kg * 2.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationProject {
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub type_name: String,
    pub description: String,
    pub cost_per_token: Decimal,
    pub available_tokens: i64,
    pub impact: &'static str,
    pub verified: bool,
    pub location: String,
}

impl From<&Project> for CompensationProject {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            kind: project.kind.clone(),
            type_name: project_type_name(&project.kind).to_string(),
            description: project.description.clone(),
            cost_per_token: Decimal::new(project.price_cents, 2),
            available_tokens: project.token_balance,
            impact: project_impact(&project.kind),
            verified: project.is_verified(),
            location: project.location.clone(),
        }
    }
}

/// Case-insensitive match on name, description or type.
pub fn search_projects<'a>(
    projects: &'a [CompensationProject],
    query: &str,
) -> Result<Vec<&'a CompensationProject>, ApiError> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Err(ApiError::validation("Digite um termo para buscar."));
    }
    Ok(projects
        .iter()
        .filter(|project| {
            project.name.to_lowercase().contains(&query)
                || project.description.to_lowercase().contains(&query)
                || project.kind.to_lowercase().contains(&query)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionOption {
    pub id: EntityId,
    pub label: String,
    pub co2_kg: f64,
    pub tokens_needed: i64,
}

pub fn emission_options(user_id: &EntityId, emissions: &[Emission], sources: &[EmissionSource]) -> Vec<EmissionOption> {
    let index = index_sources(sources);
    emissions_of(user_id, emissions)
        .into_iter()
        .filter_map(|emission| {
            let id = emission.id.clone()?;
            let source = source_of(emission, &index)
                .map(|source| source.description.as_str())
                .unwrap_or("Desconhecido");
            Some(EmissionOption {
                id,
                label: format!(
                    "{} kg CO₂ de {} em {}",
                    format::number(emission.co2_kg),
                    source,
                    format::date(&emission.recorded_at)
                ),
                co2_kg: emission.co2_kg,
                tokens_needed: conversion::kg_to_tokens(emission.co2_kg, Rounding::Ceil),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompensationView {
    pub balance: i64,
    pub history: Vec<CompensationRecord>,
    pub totals: CompensationTotals,
    pub projects: Vec<CompensationProject>,
    pub emissions: Vec<EmissionOption>,
}

pub async fn load_view(backend: &Backend, user_id: &EntityId) -> CompensationView {
    let (user, projects, emissions, sources, transactions) = tokio::join!(
        backend.get_user(user_id),
        backend.list_projects(),
        backend.list_emissions(),
        backend.list_sources(),
        backend.list_transactions()
    );

    let balance = user.map(|user| user.token_balance).unwrap_or_else(|err| {
        warn!("failed to load token balance: {err}");
        0
    });
    let projects = projects.unwrap_or_else(|err| {
        warn!("failed to load projects: {err}");
        Vec::new()
    });
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

    let history = history(user_id, &transactions, &projects);
    CompensationView {
        balance,
        totals: totals(&history),
        history,
        projects: projects.iter().map(CompensationProject::from).collect(),
        emissions: emission_options(user_id, &emissions, &sources),
    }
}

pub fn history_csv(records: &[CompensationRecord]) -> String {
    let mut out = String::from("Data,Projeto,Tipo,Tokens,CO₂ (kg),Custo,Certificado,Status\n");
    for record in records {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},completed\n",
            csv_field(&record.date),
            csv_field(&record.project),
            csv_field(&record.kind),
            record.tokens,
            record.emissions,
            record.cost.round_dp(2),
            record.certificate
        ));
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
