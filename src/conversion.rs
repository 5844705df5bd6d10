//! Physical quantities to platform tokens, and emission factors resolved from
//! free-text source descriptions.

/// One token stands for this many kg of CO2.
pub const KG_PER_TOKEN: f64 = 1000.0;

/// kg CO2 per kWh when the description names no known energy source (grid).
pub const GRID_FACTOR: f64 = 0.5;
/// kg CO2 per liter when the description names no known fuel (diesel).
pub const DIESEL_FACTOR: f64 = 2.68;

const ENERGY_FACTORS: [(&[&str], f64); 3] = [
    (&["solar"], 0.05),
    (&["eólica", "eolica"], 0.01),
    (&["hidrelétrica", "hidreletrica"], 0.02),
];

const FLEET_FACTORS: [(&[&str], f64); 3] = [
    (&["gasolina"], 2.31),
    (&["etanol"], 1.51),
    (&["gnv"], 2.75),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Purchases, sales and issuance.
    Floor,
    /// Compensations.
    Ceil,
}

pub fn kg_to_tokens(kg: f64, rounding: Rounding) -> i64 {
    let tokens = kg / KG_PER_TOKEN;
    match rounding {
        Rounding::Floor => tokens.floor() as i64,
        Rounding::Ceil => tokens.ceil() as i64,
    }
}

pub fn tokens_to_kg(tokens: i64) -> f64 {
    tokens as f64 * KG_PER_TOKEN
}

/// Which factor table a source belongs to, from its `tipoFonte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Energy,
    Fleet,
}

impl SourceCategory {
    pub fn from_source_type(source_type: &str) -> Option<Self> {
        match source_type.to_lowercase().as_str() {
            "energia" => Some(Self::Energy),
            "frota de veículos" => Some(Self::Fleet),
            _ => None,
        }
    }

    pub fn factor_for(self, description: &str) -> f64 {
        match self {
            Self::Energy => resolve_energy_factor(description),
            Self::Fleet => resolve_fleet_factor(description),
        }
    }
}

pub fn resolve_energy_factor(description: &str) -> f64 {
    resolve(description, &ENERGY_FACTORS).unwrap_or(GRID_FACTOR)
}

pub fn resolve_fleet_factor(description: &str) -> f64 {
    resolve(description, &FLEET_FACTORS).unwrap_or(DIESEL_FACTOR)
}

fn resolve(description: &str, table: &[(&[&str], f64)]) -> Option<f64> {
    let text = description.to_lowercase();
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(_, factor)| *factor)
}

pub fn emissions_from_consumption(consumption: f64, factor: f64) -> f64 {
    consumption * factor
}

pub fn consumption_from_emissions(emissions: f64, factor: f64) -> f64 {
    emissions / factor
}
