use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};
use std::fmt;

/// Canonical identifier for every backend entity.
///
/// The backend is inconsistent about id types (numbers, Mongo-style strings),
/// so ids are normalized to their string form at the decoding boundary and
/// compared as strings everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Self::new(text.as_str()),
            Value::Number(number) => Self::new(number.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EntityId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid entity id: {value}")))
    }
}

/// Key names a backend record may carry its id under, in priority order.
const RECORD_ID_KEYS: [&str; 2] = ["id", "_id"];
const USER_ID_KEYS: [&str; 5] = ["id", "_id", "idUsuario", "userId", "user_id"];

fn first_present_id(fields: &Map<String, Value>, keys: &[&str]) -> Option<EntityId> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(EntityId::from_value))
}

/// Extracts the user id from a login/profile payload, trying every key name
/// the backend has been seen to use.
pub fn normalize_user_id(payload: &Value) -> Option<EntityId> {
    let fields = payload.as_object()?;
    first_present_id(fields, &USER_ID_KEYS).or_else(|| {
        let nested = fields.get("usuario")?.as_object()?;
        first_present_id(nested, &RECORD_ID_KEYS)
    })
}

// Flattened id fields: the first usable key among the record's remaining
// keys wins and any other id keys are ignored.
fn record_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<EntityId>, D::Error> {
    let fields = Map::<String, Value>::deserialize(deserializer)?;
    Ok(first_present_id(&fields, &RECORD_ID_KEYS))
}

fn user_record_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<EntityId>, D::Error> {
    let fields = Map::<String, Value>::deserialize(deserializer)?;
    Ok(first_present_id(&fields, &USER_ID_KEYS))
}

fn id_entry<S: Serializer>(id: &Option<EntityId>, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(usize::from(id.is_some())))?;
    if let Some(id) = id {
        map.serialize_entry("id", id)?;
    }
    map.end()
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<EntityId>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(EntityId::from_value))
}

fn number_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn integer_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    })
}

fn text_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten, deserialize_with = "user_record_id", serialize_with = "id_entry")]
    pub id: Option<EntityId>,
    #[serde(rename = "nome", alias = "name", default, deserialize_with = "text_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub email: String,
    #[serde(rename = "empresa", alias = "company", default, deserialize_with = "text_or_empty")]
    pub company: String,
    #[serde(rename = "walletAddress", default, deserialize_with = "text_or_empty")]
    pub wallet_address: String,
    #[serde(rename = "saldoCompra", default, deserialize_with = "integer_or_zero")]
    pub token_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionSource {
    #[serde(flatten, deserialize_with = "record_id", serialize_with = "id_entry")]
    pub id: Option<EntityId>,
    #[serde(rename = "tipoFonte", default, deserialize_with = "text_or_empty")]
    pub source_type: String,
    #[serde(rename = "descricao", default, deserialize_with = "text_or_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emission {
    #[serde(flatten, deserialize_with = "record_id", serialize_with = "id_entry")]
    pub id: Option<EntityId>,
    #[serde(rename = "idUsuarioFK", default, deserialize_with = "lenient_id")]
    pub user_id: Option<EntityId>,
    #[serde(rename = "idFonteFk", alias = "idFonteFK", default, deserialize_with = "lenient_id")]
    pub source_id: Option<EntityId>,
    #[serde(rename = "quantidadeCo2", default, deserialize_with = "number_or_zero")]
    pub co2_kg: f64,
    #[serde(rename = "dataRegistro", default, deserialize_with = "text_or_empty")]
    pub recorded_at: String,
    #[serde(rename = "metodoColeta", default, deserialize_with = "text_or_empty")]
    pub collection_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(flatten, deserialize_with = "record_id", serialize_with = "id_entry")]
    pub id: Option<EntityId>,
    #[serde(rename = "nome", alias = "name", default, deserialize_with = "text_or_empty")]
    pub name: String,
    #[serde(rename = "tipo", default, deserialize_with = "text_or_empty")]
    pub kind: String,
    #[serde(rename = "descricao", default, deserialize_with = "text_or_empty")]
    pub description: String,
    #[serde(rename = "reducao", default, deserialize_with = "number_or_zero")]
    pub reduction_kg: f64,
    #[serde(rename = "saldoToken", default, deserialize_with = "integer_or_zero")]
    pub token_balance: i64,
    /// Price per token in integer cents.
    #[serde(rename = "preco", default, deserialize_with = "integer_or_zero")]
    pub price_cents: i64,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub status: String,
    #[serde(rename = "local", default, deserialize_with = "text_or_empty")]
    pub location: String,
}

impl Project {
    pub fn is_verified(&self) -> bool {
        self.status == "verificado"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Tokens bought from a project's pool.
    Compra,
    /// Tokens issued against a project's reduction claim.
    Venda,
    /// An emission retired against a project.
    Compensacao,
    Other,
}

impl TransactionKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "compra" => Self::Compra,
            "venda" => Self::Venda,
            "compensacao" => Self::Compensacao,
            _ => Self::Other,
        }
    }
}

fn transaction_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TransactionKind, D::Error> {
    text_or_empty(deserializer).map(|raw| TransactionKind::parse(&raw))
}

fn default_kind() -> TransactionKind {
    TransactionKind::Other
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(flatten, deserialize_with = "record_id", serialize_with = "id_entry")]
    pub id: Option<EntityId>,
    #[serde(rename = "idProjetoFK", default, deserialize_with = "lenient_id")]
    pub project_id: Option<EntityId>,
    #[serde(rename = "idUsuarioFK", default, deserialize_with = "lenient_id")]
    pub user_id: Option<EntityId>,
    #[serde(rename = "idEmissaoFK", default, deserialize_with = "lenient_id")]
    pub emission_id: Option<EntityId>,
    #[serde(rename = "quantidadeutilizada", default, deserialize_with = "number_or_zero")]
    pub co2_kg: f64,
    #[serde(rename = "datacompensacao", default, deserialize_with = "text_or_empty")]
    pub occurred_at: String,
    #[serde(rename = "tipotransacao", default = "default_kind", deserialize_with = "transaction_kind")]
    pub kind: TransactionKind,
}

/// The profile persisted locally after login (`bbts_user`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub wallet_address: String,
}

impl CurrentUser {
    /// Builds the local profile from a login response, falling back to the
    /// nested `usuario` object for every field.
    pub fn from_login_payload(payload: &Value) -> Option<Self> {
        let id = normalize_user_id(payload)?;
        let nested = payload.get("usuario");
        let pick = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .or_else(|| {
                    let nested = nested?;
                    keys.iter().find_map(|key| nested.get(*key).and_then(Value::as_str))
                })
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            id,
            name: pick(&["nome", "name"]),
            email: pick(&["email"]),
            company: pick(&["empresa"]),
            wallet_address: pick(&["walletAddress"]),
        })
    }
}

pub fn token_from_login_payload(payload: &Value) -> Option<String> {
    ["token", "accessToken", "jwt"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
pub struct LoginPayload<'a> {
    pub email: &'a str,
    pub senha: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterPayload<'a> {
    pub nome: &'a str,
    pub email: &'a str,
    pub perfil: &'a str,
    pub senha: &'a str,
}

/// Partial user update; absent fields are left untouched by the backend.
#[derive(Debug, Default, Serialize)]
pub struct UserUpdate {
    #[serde(rename = "saldoCompra", skip_serializing_if = "Option::is_none")]
    pub token_balance: Option<i64>,
    #[serde(rename = "nome", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "senhaAtual", skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(rename = "senha", skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(rename = "reducao", skip_serializing_if = "Option::is_none")]
    pub reduction_kg: Option<f64>,
    #[serde(rename = "saldoToken", skip_serializing_if = "Option::is_none")]
    pub token_balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEmission {
    #[serde(rename = "idUsuarioFK")]
    pub user_id: EntityId,
    #[serde(rename = "quantidadeCo2")]
    pub co2_kg: f64,
    #[serde(rename = "dataRegistro")]
    pub recorded_at: String,
    #[serde(rename = "metodoColeta")]
    pub collection_method: String,
    #[serde(rename = "idFonteFk")]
    pub source_id: EntityId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcePayload {
    #[serde(rename = "tipoFonte")]
    pub source_type: String,
    #[serde(rename = "descricao")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "reducao")]
    pub reduction_kg: i64,
    #[serde(rename = "saldoToken")]
    pub token_balance: i64,
    #[serde(rename = "local")]
    pub location: String,
    #[serde(rename = "preco")]
    pub price_cents: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "idProjetoFK")]
    pub project_id: EntityId,
    #[serde(rename = "idUsuarioFK")]
    pub user_id: EntityId,
    #[serde(rename = "idEmissaoFK", skip_serializing_if = "Option::is_none")]
    pub emission_id: Option<EntityId>,
    #[serde(rename = "quantidadeutilizada")]
    pub co2_kg: f64,
    #[serde(rename = "datacompensacao")]
    pub occurred_at: String,
    #[serde(rename = "tipotransacao")]
    pub kind: TransactionKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_is_found_under_any_known_key() {
        assert_eq!(normalize_user_id(&json!({ "id": 7 })).unwrap().as_str(), "7");
        assert_eq!(normalize_user_id(&json!({ "_id": "abc" })).unwrap().as_str(), "abc");
        assert_eq!(normalize_user_id(&json!({ "user_id": "u1" })).unwrap().as_str(), "u1");
        assert_eq!(
            normalize_user_id(&json!({ "usuario": { "_id": "nested" } })).unwrap().as_str(),
            "nested"
        );
        assert!(normalize_user_id(&json!({ "nome": "Ana" })).is_none());
    }

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let from_number: EntityId = serde_json::from_value(json!(42)).unwrap();
        let from_text: EntityId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(from_number, from_text);
    }

    #[test]
    fn null_and_missing_numbers_read_as_zero() {
        let emission: Emission = serde_json::from_value(json!({
            "id": 1,
            "idUsuarioFK": 3,
            "idFonteFk": 2,
            "quantidadeCo2": null
        }))
        .unwrap();
        assert_eq!(emission.co2_kg, 0.0);
        assert!(emission.recorded_at.is_empty());

        let project: Project = serde_json::from_value(json!({ "_id": "p1", "nome": "Solar" })).unwrap();
        assert_eq!(project.token_balance, 0);
        assert_eq!(project.id.unwrap().as_str(), "p1");
    }

    #[test]
    fn records_with_several_id_keys_still_decode() {
        let emissions: Vec<Emission> = serde_json::from_value(json!([
            { "id": 1, "_id": "abc", "idUsuarioFK": 3, "quantidadeCo2": 12.5 },
            { "id": 2, "idUsuarioFK": 3, "quantidadeCo2": 4 },
            { "id": null, "_id": "m3", "quantidadeCo2": 1 }
        ]))
        .unwrap();
        let ids: Vec<&str> = emissions
            .iter()
            .map(|emission| emission.id.as_ref().unwrap().as_str())
            .collect();
        assert_eq!(ids, ["1", "2", "m3"]);
        assert_eq!(emissions[0].co2_kg, 12.5);

        let user: User = serde_json::from_value(json!({ "id": 7, "_id": "7", "userId": 9, "saldoCompra": 3 })).unwrap();
        assert_eq!(user.id.unwrap().as_str(), "7");
        assert_eq!(user.token_balance, 3);

        let user: User = serde_json::from_value(json!({ "idUsuario": "u5", "nome": "Ana" })).unwrap();
        assert_eq!(user.id.unwrap().as_str(), "u5");

        let source: EmissionSource =
            serde_json::from_value(json!({ "_id": "s1", "id": "", "tipoFonte": "Energia" })).unwrap();
        assert_eq!(serde_json::to_value(&source).unwrap()["id"], "s1");
    }

    #[test]
    fn unknown_transaction_kind_is_other() {
        let tx: Transaction = serde_json::from_value(json!({
            "tipotransacao": "estorno",
            "quantidadeutilizada": 10
        }))
        .unwrap();
        assert_eq!(tx.kind, TransactionKind::Other);
    }

    #[test]
    fn login_payload_builds_profile_from_nested_user() {
        let payload = json!({
            "token": "jwt-1",
            "usuario": { "id": 9, "nome": "Ana", "email": "ana@bb.com", "empresa": "BB" }
        });
        let user = CurrentUser::from_login_payload(&payload).unwrap();
        assert_eq!(user.id.as_str(), "9");
        assert_eq!(user.name, "Ana");
        assert_eq!(user.company, "BB");
        assert_eq!(token_from_login_payload(&payload).as_deref(), Some("jwt-1"));
    }

    #[test]
    fn side_transaction_omits_missing_emission() {
        let tx = NewTransaction {
            project_id: EntityId::new("p").unwrap(),
            user_id: EntityId::new("u").unwrap(),
            emission_id: None,
            co2_kg: 5000.0,
            occurred_at: "2025-01-01T00:00:00.000Z".into(),
            kind: TransactionKind::Venda,
        };
        let body = serde_json::to_value(&tx).unwrap();
        assert!(body.get("idEmissaoFK").is_none());
        assert_eq!(body["tipotransacao"], "venda");
    }
}
