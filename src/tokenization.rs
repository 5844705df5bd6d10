//! Project catalog, token issuance and token purchases.

use crate::conversion::{self, Rounding};
use crate::errors::ApiError;
use crate::format;
use crate::gateway::Backend;
use crate::models::{
    EntityId, NewProject, NewTransaction, Project, ProjectUpdate, Transaction, TransactionKind, UserUpdate,
};
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Emission,
    Purchase,
    Transfer,
    Other,
}

impl HistoryKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Emission => "Emissão",
            Self::Purchase => "Compra",
            Self::Transfer => "Compensação",
            Self::Other => "Outro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenHistoryEntry {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub amount: i64,
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCard {
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub tokens_available: i64,
    pub price_per_token: Decimal,
    pub total_reduction: f64,
    pub verified: bool,
    pub location: String,
}

impl From<&Project> for ProjectCard {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            kind: project.kind.clone(),
            description: project.description.clone(),
            tokens_available: project.token_balance,
            price_per_token: Decimal::new(project.price_cents, 2),
            total_reduction: project.reduction_kg,
            verified: project.is_verified(),
            location: project.location.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenizationView {
    pub balance: i64,
    pub history: Vec<TokenHistoryEntry>,
    pub projects: Vec<ProjectCard>,
}

pub fn project_names(projects: &[Project]) -> HashMap<EntityId, String> {
    projects
        .iter()
        .filter_map(|project| {
            let name = if project.name.is_empty() {
                "Projeto".to_string()
            } else {
                project.name.clone()
            };
            project.id.clone().map(|id| (id, name))
        })
        .collect()
}

/// Compensations retire tokens (rounded up), every other row credits them
/// (rounded down).
pub fn token_history(user_id: &EntityId, transactions: &[Transaction], projects: &[Project]) -> Vec<TokenHistoryEntry> {
    let names = project_names(projects);
    let today = Local::now().format("%Y-%m-%d").to_string();

    transactions
        .iter()
        .filter(|transaction| transaction.user_id.as_ref() == Some(user_id))
        .map(|transaction| {
            let (kind, amount) = match transaction.kind {
                TransactionKind::Compensacao => {
                    (HistoryKind::Transfer, -conversion::kg_to_tokens(transaction.co2_kg, Rounding::Ceil))
                }
                TransactionKind::Venda => (HistoryKind::Emission, conversion::kg_to_tokens(transaction.co2_kg, Rounding::Floor)),
                TransactionKind::Compra => (HistoryKind::Purchase, conversion::kg_to_tokens(transaction.co2_kg, Rounding::Floor)),
                TransactionKind::Other => (HistoryKind::Other, conversion::kg_to_tokens(transaction.co2_kg, Rounding::Floor)),
            };
            let date = match transaction.occurred_at.split('T').next() {
                Some(day) if !day.is_empty() => day.to_string(),
                _ => today.clone(),
            };
            let project = transaction
                .project_id
                .as_ref()
                .and_then(|id| names.get(id).cloned())
                .unwrap_or_else(|| "Projeto não identificado".to_string());
            TokenHistoryEntry { date, kind, amount, project }
        })
        .collect()
}

pub async fn load_view(backend: &Backend, user_id: &EntityId) -> TokenizationView {
    let (user, transactions, projects) = tokio::join!(
        backend.get_user(user_id),
        backend.list_transactions(),
        backend.list_projects()
    );

    let balance = match user {
        Ok(user) => user.token_balance,
        Err(err) => {
            warn!("failed to load token balance: {err}");
            0
        }
    };
    let (history, projects) = match (transactions, projects) {
        (Ok(transactions), Ok(projects)) => (
            token_history(user_id, &transactions, &projects),
            projects.iter().map(ProjectCard::from).collect(),
        ),
        (Err(err), Ok(projects)) => {
            warn!("failed to load transactions: {err}");
            (Vec::new(), projects.iter().map(ProjectCard::from).collect())
        }
        (_, Err(err)) => {
            warn!("failed to load projects: {err}");
            (Vec::new(), Vec::new())
        }
    };

    TokenizationView { balance, history, projects }
}

pub fn history_csv(history: &[TokenHistoryEntry]) -> String {
    let mut out = String::from("Data,Tipo,Quantidade,Projeto\n");
    for entry in history {
        out.push_str(&format!(
            "{},{},{},\"{}\"\n",
            entry.date,
            entry.kind.label(),
            entry.amount,
            entry.project.replace('"', "\"\"")
        ));
    }
    out
}

/// Reads an integer the way form fields are read: leading sign and digits,
/// anything unparsable is zero.
pub fn leading_integer(raw: &str) -> i64 {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|value| sign * value).unwrap_or(0)
}

/// Keeps only the digits of a masked price (`1.234,56`) and reads them as cents.
pub fn parse_price_cents(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProjectForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reduction: String,
    #[serde(default)]
    pub tokens: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub price: String,
}

impl NewProjectForm {
    pub fn validate(&self) -> Result<NewProject, ApiError> {
        let project = NewProject {
            name: self.name.trim().to_string(),
            kind: self.kind.trim().to_string(),
            description: self.description.trim().to_string(),
            reduction_kg: leading_integer(&self.reduction),
            token_balance: leading_integer(&self.tokens),
            location: self.location.trim().to_string(),
            price_cents: parse_price_cents(&self.price),
            status: self.status.trim().to_string(),
        };
        let missing = [&project.name, &project.kind, &project.description, &project.location, &project.status]
            .iter()
            .any(|field| field.is_empty());
        if missing || project.price_cents == 0 {
            return Err(ApiError::validation("Preencha todos os campos corretamente."));
        }
        Ok(project)
    }
}

pub async fn create_project(backend: &Backend, form: &NewProjectForm) -> Result<(), ApiError> {
    let project = form.validate()?;
    backend.create_project(&project).await?;
    info!("project created: {}", project.name);
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueForm {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub reduction: String,
    #[serde(default)]
    pub tokens: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    pub project_id: EntityId,
    pub reduction_kg: i64,
    pub tokens: i64,
}

impl IssueForm {
    /// Applies the linked-field fill-in: a blank token count follows the
    /// reduction (floored), a blank reduction follows the tokens.
    pub fn resolve(&self) -> Result<Issuance, ApiError> {
        let project_id = EntityId::new(self.project_id.as_str())
            .ok_or_else(|| ApiError::validation("Por favor, selecione um projeto."))?;
        let mut reduction_kg = leading_integer(&self.reduction);
        let mut tokens = leading_integer(&self.tokens);

        if self.tokens.trim().is_empty() && reduction_kg > 0 {
            tokens = conversion::kg_to_tokens(reduction_kg as f64, Rounding::Floor);
        }
        if self.reduction.trim().is_empty() && tokens > 0 {
            reduction_kg = conversion::tokens_to_kg(tokens) as i64;
        }

        if reduction_kg <= 0 && tokens <= 0 {
            return Err(ApiError::validation("Informe a redução de emissões ou quantidade de tokens."));
        }
        Ok(Issuance {
            project_id,
            reduction_kg,
            tokens,
        })
    }
}

/// Credits a project with new tokens and reduction, then records a `venda`
/// transaction. The ledger write is best-effort.
pub async fn issue_tokens(
    backend: &Backend,
    user_id: &EntityId,
    form: &IssueForm,
    link_max_co2: Option<f64>,
) -> Result<Issuance, ApiError> {
    let issuance = form.resolve()?;
    let project = backend.get_project(&issuance.project_id).await?;

    let update = ProjectUpdate {
        reduction_kg: Some(project.reduction_kg + issuance.reduction_kg as f64),
        token_balance: Some(project.token_balance + issuance.tokens),
    };
    backend.update_project(&issuance.project_id, &update).await?;
    info!(
        "issued {} tokens to project {} (balance {} -> {})",
        issuance.tokens,
        issuance.project_id,
        project.token_balance,
        project.token_balance + issuance.tokens
    );

    record_side_transaction(
        backend,
        user_id,
        &issuance.project_id,
        issuance.reduction_kg as f64,
        TransactionKind::Venda,
        link_max_co2,
    )
    .await;
    Ok(issuance)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuyForm {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub payment_method: String,
    /// Tokens available as shown when the form was rendered.
    #[serde(default)]
    pub available: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub project_id: EntityId,
    pub amount: i64,
}

impl BuyForm {
    pub fn validate(&self) -> Result<Purchase, ApiError> {
        let project_id = EntityId::new(self.project_id.as_str())
            .ok_or_else(|| ApiError::validation("Projeto não identificado."))?;
        let amount = leading_integer(&self.amount);
        if amount <= 0 {
            return Err(ApiError::validation("Informe uma quantidade válida."));
        }
        let available = leading_integer(&self.available);
        if amount > available {
            return Err(ApiError::validation(format!(
                "Quantidade indisponível. Máximo: {available} tokens."
            )));
        }
        if self.payment_method.trim().is_empty() {
            return Err(ApiError::validation("Selecione um método de pagamento."));
        }
        Ok(Purchase { project_id, amount })
    }
}

/// Moves tokens from a project's pool to the user. Project and user updates
/// are separate requests; a failed user update leaves the project debited.
pub async fn buy_tokens(
    backend: &Backend,
    user_id: &EntityId,
    form: &BuyForm,
    link_max_co2: Option<f64>,
) -> Result<Purchase, ApiError> {
    let purchase = form.validate()?;
    let project = backend.get_project(&purchase.project_id).await?;
    let user = backend.get_user(user_id).await?;

    let project_update = ProjectUpdate {
        token_balance: Some(project.token_balance - purchase.amount),
        ..ProjectUpdate::default()
    };
    backend.update_project(&purchase.project_id, &project_update).await?;

    let user_update = UserUpdate {
        token_balance: Some(user.token_balance + purchase.amount),
        ..UserUpdate::default()
    };
    if let Err(err) = backend.update_user(user_id, &user_update).await {
        error!(
            "project {} debited {} tokens but crediting user {user_id} failed: {err}",
            purchase.project_id, purchase.amount
        );
        return Err(ApiError::incomplete("atualizar saldo do usuário", err));
    }
    info!(
        "user {user_id} bought {} tokens from project {}",
        purchase.amount, purchase.project_id
    );

    record_side_transaction(
        backend,
        user_id,
        &purchase.project_id,
        conversion::tokens_to_kg(purchase.amount),
        TransactionKind::Compra,
        link_max_co2,
    )
    .await;
    Ok(purchase)
}

/// The first of the user's emissions at or below the threshold, if linkage is on.
pub fn linked_emission(
    user_id: &EntityId,
    emissions: &[crate::models::Emission],
    max_co2: Option<f64>,
) -> Option<EntityId> {
    let max_co2 = max_co2?;
    emissions
        .iter()
        .find(|emission| emission.user_id.as_ref() == Some(user_id) && emission.co2_kg <= max_co2)
        .and_then(|emission| emission.id.clone())
}

async fn record_side_transaction(
    backend: &Backend,
    user_id: &EntityId,
    project_id: &EntityId,
    co2_kg: f64,
    kind: TransactionKind,
    link_max_co2: Option<f64>,
) {
    let emission_id = match link_max_co2 {
        Some(_) => match backend.list_emissions().await {
            Ok(emissions) => linked_emission(user_id, &emissions, link_max_co2),
            Err(err) => {
                warn!("skipping {kind:?} transaction, emissions unavailable: {err}");
                return;
            }
        },
        None => None,
    };

    let transaction = NewTransaction {
        project_id: project_id.clone(),
        user_id: user_id.clone(),
        emission_id,
        co2_kg,
        occurred_at: format::iso_now(),
        kind,
    };
    match backend.create_transaction(&transaction).await {
        Ok(()) => info!("{kind:?} transaction recorded for project {project_id}"),
        Err(err) => warn!("failed to record {kind:?} transaction for project {project_id}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emission;
    use serde_json::json;

    fn user() -> EntityId {
        EntityId::new("7").unwrap()
    }

    #[test]
    fn history_signs_and_rounding() {
        let transactions: Vec<Transaction> = serde_json::from_value(json!([
            { "idUsuarioFK": 7, "idProjetoFK": 1, "tipotransacao": "compensacao", "quantidadeutilizada": 2500, "datacompensacao": "2025-03-01T10:00:00Z" },
            { "idUsuarioFK": 7, "idProjetoFK": 1, "tipotransacao": "venda", "quantidadeutilizada": 2500, "datacompensacao": "2025-03-02T10:00:00Z" },
            { "idUsuarioFK": 7, "idProjetoFK": 9, "tipotransacao": "compra", "quantidadeutilizada": 3000 },
            { "idUsuarioFK": 8, "idProjetoFK": 1, "tipotransacao": "compra", "quantidadeutilizada": 3000 }
        ]))
        .unwrap();
        let projects: Vec<Project> = serde_json::from_value(json!([{ "id": 1, "nome": "Solar Norte" }])).unwrap();

        let history = token_history(&user(), &transactions, &projects);
        assert_eq!(history.len(), 3);
        assert_eq!((history[0].kind, history[0].amount), (HistoryKind::Transfer, -3));
        assert_eq!(history[0].date, "2025-03-01");
        assert_eq!((history[1].kind, history[1].amount), (HistoryKind::Emission, 2));
        assert_eq!(history[1].project, "Solar Norte");
        assert_eq!((history[2].kind, history[2].amount), (HistoryKind::Purchase, 3));
        assert_eq!(history[2].project, "Projeto não identificado");
        assert_eq!(history[2].date.len(), 10);
    }

    #[test]
    fn project_card_price_in_reais() {
        let project: Project =
            serde_json::from_value(json!({ "id": 1, "nome": "P", "preco": 4550, "status": "verificado" })).unwrap();
        let card = ProjectCard::from(&project);
        assert_eq!(card.price_per_token, Decimal::new(4550, 2));
        assert!(card.verified);
        assert_eq!(format::currency(card.price_per_token), "45,50");
    }

    #[test]
    fn price_keeps_only_digits() {
        assert_eq!(parse_price_cents("1.234,56"), 123_456);
        assert_eq!(parse_price_cents("R$ 0,00"), 0);
        assert_eq!(parse_price_cents("abc"), 0);
    }

    #[test]
    fn new_project_requires_every_field_and_a_price() {
        let mut form = NewProjectForm {
            name: "Reflorestamento".into(),
            kind: "reflorestamento".into(),
            description: "Mata Atlântica".into(),
            reduction: "5000".into(),
            tokens: "5".into(),
            location: "SP".into(),
            status: "verificado".into(),
            price: "0,00".into(),
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "Preencha todos os campos corretamente.");

        form.price = "45,50".into();
        let project = form.validate().unwrap();
        assert_eq!(project.price_cents, 4550);
        assert_eq!(project.reduction_kg, 5000);

        form.location = "  ".into();
        assert!(form.validate().is_err());
    }

    #[test]
    fn issuance_fills_tokens_from_reduction() {
        let form = IssueForm {
            project_id: "p1".into(),
            reduction: "5000".into(),
            tokens: String::new(),
        };
        let issuance = form.resolve().unwrap();
        assert_eq!(issuance.tokens, 5);
        assert_eq!(issuance.reduction_kg, 5000);

        let form = IssueForm {
            project_id: "p1".into(),
            reduction: String::new(),
            tokens: "3".into(),
        };
        assert_eq!(form.resolve().unwrap().reduction_kg, 3000);
    }

    #[test]
    fn issuance_validation_order() {
        let form = IssueForm::default();
        assert_eq!(form.resolve().unwrap_err().to_string(), "Por favor, selecione um projeto.");
        let form = IssueForm {
            project_id: "p1".into(),
            reduction: "0".into(),
            tokens: "0".into(),
        };
        assert_eq!(
            form.resolve().unwrap_err().to_string(),
            "Informe a redução de emissões ou quantidade de tokens."
        );
    }

    #[test]
    fn buy_validation_order() {
        let mut form = BuyForm::default();
        assert_eq!(form.validate().unwrap_err().to_string(), "Projeto não identificado.");
        form.project_id = "p1".into();
        assert_eq!(form.validate().unwrap_err().to_string(), "Informe uma quantidade válida.");
        form.amount = "12".into();
        form.available = "10".into();
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Quantidade indisponível. Máximo: 10 tokens."
        );
        form.amount = "10".into();
        assert_eq!(form.validate().unwrap_err().to_string(), "Selecione um método de pagamento.");
        form.payment_method = "pix".into();
        assert_eq!(form.validate().unwrap().amount, 10);
    }

    #[test]
    fn linkage_picks_first_small_emission_of_user() {
        let emissions: Vec<Emission> = serde_json::from_value(json!([
            { "id": 1, "idUsuarioFK": 8, "quantidadeCo2": 0.1 },
            { "id": 2, "idUsuarioFK": 7, "quantidadeCo2": 10.0 },
            { "id": 3, "idUsuarioFK": 7, "quantidadeCo2": 0.5 },
            { "id": 4, "idUsuarioFK": 7, "quantidadeCo2": 0.2 }
        ]))
        .unwrap();
        assert_eq!(linked_emission(&user(), &emissions, Some(0.5)).unwrap().as_str(), "3");
        assert_eq!(linked_emission(&user(), &emissions, None), None);
        assert_eq!(linked_emission(&user(), &emissions, Some(0.01)), None);
    }

    #[test]
    fn leading_integer_reads_like_a_form_field() {
        assert_eq!(leading_integer("42"), 42);
        assert_eq!(leading_integer(" 12abc"), 12);
        assert_eq!(leading_integer("-3"), -3);
        assert_eq!(leading_integer("x1"), 0);
        assert_eq!(leading_integer(""), 0);
    }
}
