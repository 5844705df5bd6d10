//! Emission history, the consumption calculator and the source catalog.

use crate::conversion::{self, SourceCategory};
use crate::errors::ApiError;
use crate::gateway::Backend;
use crate::models::{EmissionSource, Emission, EntityId, NewEmission, SourcePayload};
use crate::stats::{emissions_of, index_sources, source_of};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Energy rows whose derived consumption does not exceed this (kWh) are not listed.
pub const MIN_LISTED_ENERGY_CONSUMPTION: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Option<EntityId>,
    pub date: String,
    pub source: String,
    pub consumption: f64,
    pub emissions: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmissionHistory {
    pub energy: Vec<HistoryEntry>,
    pub fleet: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringView {
    pub history: EmissionHistory,
    pub energy_sources: Vec<EmissionSource>,
    pub fleet_sources: Vec<EmissionSource>,
    pub sources: Vec<EmissionSource>,
}

/// The user's emissions split by category, each with the consumption that
/// produced it (`emissions / factor`).
pub fn build_history(user_id: &EntityId, emissions: &[Emission], sources: &[EmissionSource]) -> EmissionHistory {
    let index = index_sources(sources);
    let mut history = EmissionHistory::default();

    for emission in emissions_of(user_id, emissions) {
        let Some(source) = source_of(emission, &index) else {
            continue;
        };
        let Some(category) = SourceCategory::from_source_type(&source.source_type) else {
            continue;
        };
        let factor = category.factor_for(&source.description);
        let entry = HistoryEntry {
            id: emission.id.clone(),
            date: emission.recorded_at.clone(),
            source: if source.description.is_empty() {
                "Desconhecido".to_string()
            } else {
                source.description.clone()
            },
            consumption: conversion::consumption_from_emissions(emission.co2_kg, factor),
            emissions: emission.co2_kg,
            factor,
        };
        match category {
            SourceCategory::Energy if entry.consumption > MIN_LISTED_ENERGY_CONSUMPTION => {
                history.energy.push(entry)
            }
            SourceCategory::Energy => {}
            SourceCategory::Fleet => history.fleet.push(entry),
        }
    }

    history
}

pub fn sources_in(category: SourceCategory, sources: &[EmissionSource]) -> Vec<EmissionSource> {
    sources
        .iter()
        .filter(|source| SourceCategory::from_source_type(&source.source_type) == Some(category))
        .cloned()
        .collect()
}

pub async fn load_view(backend: &Backend, user_id: &EntityId) -> MonitoringView {
    let (emissions, sources) = tokio::join!(backend.list_emissions(), backend.list_sources());
    let sources = sources.unwrap_or_else(|err| {
        warn!("failed to load emission sources: {err}");
        Vec::new()
    });
    let history = match emissions {
        Ok(emissions) => build_history(user_id, &emissions, &sources),
        Err(err) => {
            warn!("failed to load emissions: {err}");
            EmissionHistory::default()
        }
    };

    MonitoringView {
        history,
        energy_sources: sources_in(SourceCategory::Energy, &sources),
        fleet_sources: sources_in(SourceCategory::Fleet, &sources),
        sources,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calculation {
    pub category: SourceCategory,
    pub consumption: f64,
    pub factor: f64,
    pub emissions: f64,
}

pub fn calculate(category: SourceCategory, consumption: f64, source_description: &str) -> Calculation {
    let factor = category.factor_for(source_description);
    Calculation {
        category,
        consumption,
        factor,
        emissions: conversion::emissions_from_consumption(consumption, factor),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmissionForm {
    pub category: SourceCategory,
    #[serde(default)]
    pub consumption: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub collection_method: String,
}

impl EmissionForm {
    fn consumption(&self) -> f64 {
        parse_quantity(&self.consumption)
    }
}

/// Accepts `1234.5` as well as the pt-BR `1234,5`; anything else reads as zero.
pub fn parse_quantity(raw: &str) -> f64 {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Checks made before anything is fetched. Factors are all positive, so a
/// positive consumption is what makes the calculated emissions positive.
pub fn validate_emission(form: &EmissionForm) -> Result<EntityId, ApiError> {
    if form.consumption() <= 0.0 {
        return Err(ApiError::validation("Calcule as emissões antes de salvar."));
    }
    EntityId::new(form.source_id.as_str()).ok_or_else(|| {
        ApiError::validation(match form.category {
            SourceCategory::Energy => "Por favor, selecione uma fonte de energia.",
            SourceCategory::Fleet => "Por favor, selecione um tipo de combustível.",
        })
    })
}

pub fn prepare_emission(
    user_id: &EntityId,
    form: &EmissionForm,
    sources: &[EmissionSource],
) -> Result<(NewEmission, Calculation), ApiError> {
    let source_id = validate_emission(form)?;
    let description = sources
        .iter()
        .find(|source| source.id.as_ref() == Some(&source_id))
        .map(|source| source.description.as_str())
        .unwrap_or_default();
    let calculation = calculate(form.category, form.consumption(), description);
    if calculation.emissions <= 0.0 {
        return Err(ApiError::validation("Calcule as emissões antes de salvar."));
    }

    let recorded_at = match form.date.trim() {
        "" => Local::now().format("%Y-%m-%d").to_string(),
        date => date.to_string(),
    };

    Ok((
        NewEmission {
            user_id: user_id.clone(),
            co2_kg: calculation.emissions,
            recorded_at,
            collection_method: form.collection_method.trim().to_string(),
            source_id,
        },
        calculation,
    ))
}

pub async fn record_emission(
    backend: &Backend,
    user_id: &EntityId,
    form: &EmissionForm,
) -> Result<Calculation, ApiError> {
    validate_emission(form)?;
    let sources = backend.list_sources().await?;
    let (emission, calculation) = prepare_emission(user_id, form, &sources)?;
    backend.create_emission(&emission).await?;
    info!(
        "emission recorded: {} kg CO2 ({:?}) for user {user_id}",
        calculation.emissions, calculation.category
    );
    Ok(calculation)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceForm {
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub description: String,
}

impl SourceForm {
    pub fn validate(&self) -> Result<SourcePayload, ApiError> {
        let source_type = self.source_type.trim();
        if source_type.is_empty() {
            return Err(ApiError::validation("O tipo de fonte é obrigatório."));
        }
        Ok(SourcePayload {
            source_type: source_type.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

pub async fn create_source(backend: &Backend, form: &SourceForm) -> Result<(), ApiError> {
    let payload = form.validate()?;
    backend.create_source(&payload).await?;
    info!("emission source created: {}", payload.source_type);
    Ok(())
}

pub async fn update_source(backend: &Backend, id: &EntityId, form: &SourceForm) -> Result<(), ApiError> {
    let payload = form.validate()?;
    backend.update_source(id, &payload).await?;
    info!("emission source {id} updated");
    Ok(())
}

pub async fn delete_source(backend: &Backend, id: &EntityId) -> Result<(), ApiError> {
    backend.delete_source(id).await?;
    info!("emission source {id} deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sources() -> Vec<EmissionSource> {
        serde_json::from_value(json!([
            { "id": 1, "tipoFonte": "Energia", "descricao": "Energia Solar" },
            { "id": 2, "tipoFonte": "energia", "descricao": "Rede Elétrica" },
            { "id": 3, "tipoFonte": "Frota de Veículos", "descricao": "Diesel" },
            { "id": 4, "tipoFonte": "Resíduos", "descricao": "Aterro" }
        ]))
        .unwrap()
    }

    fn emissions() -> Vec<Emission> {
        serde_json::from_value(json!([
            { "id": 10, "idUsuarioFK": 7, "idFonteFk": 1, "quantidadeCo2": 5.0, "dataRegistro": "2025-01-01" },
            { "id": 11, "idUsuarioFK": 7, "idFonteFk": 1, "quantidadeCo2": 0.04, "dataRegistro": "2025-01-02" },
            { "id": 12, "idUsuarioFK": 7, "idFonteFk": 2, "quantidadeCo2": 0.5, "dataRegistro": "2025-01-03" },
            { "id": 13, "idUsuarioFK": 7, "idFonteFk": 3, "quantidadeCo2": 1.34, "dataRegistro": "2025-01-04" },
            { "id": 14, "idUsuarioFK": 7, "idFonteFk": 4, "quantidadeCo2": 9.0, "dataRegistro": "2025-01-05" },
            { "id": 15, "idUsuarioFK": 8, "idFonteFk": 3, "quantidadeCo2": 9.0, "dataRegistro": "2025-01-05" }
        ]))
        .unwrap()
    }

    #[test]
    fn history_derives_consumption_and_hides_tiny_energy_rows() {
        let user = EntityId::new("7").unwrap();
        let history = build_history(&user, &emissions(), &sources());

        assert_eq!(history.energy.len(), 1);
        assert_eq!(history.energy[0].source, "Energia Solar");
        assert!((history.energy[0].consumption - 100.0).abs() < 1e-9);

        assert_eq!(history.fleet.len(), 1);
        assert!((history.fleet[0].consumption - 0.5).abs() < 1e-9);
        assert_eq!(history.fleet[0].factor, conversion::DIESEL_FACTOR);
    }

    #[test]
    fn dropdowns_filter_by_category() {
        let all = sources();
        assert_eq!(sources_in(SourceCategory::Energy, &all).len(), 2);
        assert_eq!(sources_in(SourceCategory::Fleet, &all).len(), 1);
    }

    #[test]
    fn calculator_uses_description_factor() {
        let calc = calculate(SourceCategory::Fleet, 100.0, "Gasolina comum");
        assert!((calc.emissions - 231.0).abs() < 1e-9);
        let calc = calculate(SourceCategory::Energy, 1000.0, "");
        assert_eq!(calc.emissions, 500.0);
    }

    #[test]
    fn emission_needs_consumption_then_source() {
        let user = EntityId::new("7").unwrap();
        let mut form = EmissionForm {
            category: SourceCategory::Fleet,
            consumption: String::new(),
            source_id: String::new(),
            date: "2025-02-01".into(),
            collection_method: "manual".into(),
        };
        let err = prepare_emission(&user, &form, &sources()).unwrap_err();
        assert_eq!(err.to_string(), "Calcule as emissões antes de salvar.");

        form.consumption = "10".into();
        let err = prepare_emission(&user, &form, &sources()).unwrap_err();
        assert_eq!(err.to_string(), "Por favor, selecione um tipo de combustível.");

        form.source_id = "3".into();
        let (emission, calc) = prepare_emission(&user, &form, &sources()).unwrap();
        assert!((emission.co2_kg - 26.8).abs() < 1e-9);
        assert_eq!(emission.recorded_at, "2025-02-01");
        assert_eq!(calc.factor, conversion::DIESEL_FACTOR);
    }

    #[test]
    fn energy_source_message() {
        let form = EmissionForm {
            category: SourceCategory::Energy,
            consumption: "1,5".into(),
            source_id: "  ".into(),
            date: String::new(),
            collection_method: String::new(),
        };
        assert_eq!(
            validate_emission(&form).unwrap_err().to_string(),
            "Por favor, selecione uma fonte de energia."
        );
    }

    #[test]
    fn source_type_is_required() {
        let form = SourceForm {
            source_type: "   ".into(),
            description: "x".into(),
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "O tipo de fonte é obrigatório.");

        let form = SourceForm {
            source_type: " Energia ".into(),
            description: " Solar ".into(),
        };
        let payload = form.validate().unwrap();
        assert_eq!(payload.source_type, "Energia");
        assert_eq!(payload.description, "Solar");
    }
}
