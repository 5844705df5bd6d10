use crate::errors::ApiError;
use crate::models::{
    EmissionSource, Emission, EntityId, NewEmission, NewProject, NewTransaction, Project,
    ProjectUpdate, RegisterPayload, SourcePayload, Transaction, User, UserUpdate, LoginPayload,
};
use reqwest::{Client, Method, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Entry point to the remote backend. Cheap to clone; one per application.
#[derive(Clone)]
pub struct Gateway {
    http: Client,
    base_url: Arc<str>,
}

impl Gateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    /// A backend handle that sends `Authorization: Bearer <token>` when a token is present.
    pub fn authorized(&self, token: Option<String>) -> Backend {
        Backend {
            http: self.http.clone(),
            base_url: Arc::clone(&self.base_url),
            token,
        }
    }

    /// `POST /api/usuario/login`. Returns the raw payload; callers normalize it.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value, ApiError> {
        let payload = LoginPayload {
            email,
            senha: password,
        };
        let response = self
            .http
            .post(format!("{}/api/usuario/login", self.base_url))
            .json(&payload)
            .send()
            .await?;
        let response = ensure_success(response, "Erro ao fazer login. Verifique suas credenciais.").await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// `POST /api/usuario`.
    pub async fn register(&self, payload: &RegisterPayload<'_>) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/api/usuario", self.base_url))
            .json(payload)
            .send()
            .await?;
        ensure_success(response, "Erro ao realizar cadastro. Tente novamente.").await?;
        Ok(())
    }
}

/// Authenticated access to the backend resources.
#[derive(Clone)]
pub struct Backend {
    http: Client,
    base_url: Arc<str>,
    token: Option<String>,
}

impl Backend {
    pub async fn get_user(&self, id: &EntityId) -> Result<User, ApiError> {
        self.get_json(&format!("/api/usuario/{id}"), "Erro ao buscar dados do usuário")
            .await
    }

    pub async fn update_user(&self, id: &EntityId, update: &UserUpdate) -> Result<(), ApiError> {
        self.send_json(
            Method::PUT,
            &format!("/api/usuario/{id}"),
            update,
            "Erro ao atualizar usuário",
        )
        .await
    }

    /// Same endpoint as `update_user`, with the password-specific error message.
    pub async fn change_password(&self, id: &EntityId, update: &UserUpdate) -> Result<(), ApiError> {
        self.send_json(
            Method::PUT,
            &format!("/api/usuario/{id}"),
            update,
            "Erro ao alterar senha. Verifique sua senha atual.",
        )
        .await
    }

    pub async fn list_emissions(&self) -> Result<Vec<Emission>, ApiError> {
        self.get_json("/api/emissao", "Erro ao buscar emissões").await
    }

    pub async fn create_emission(&self, emission: &NewEmission) -> Result<(), ApiError> {
        self.send_json(Method::POST, "/api/emissao", emission, "Erro ao registrar emissão.")
            .await
    }

    pub async fn list_sources(&self) -> Result<Vec<EmissionSource>, ApiError> {
        self.get_json("/api/fonteEmissao", "Erro ao buscar fontes de emissão")
            .await
    }

    pub async fn create_source(&self, source: &SourcePayload) -> Result<(), ApiError> {
        self.send_json(Method::POST, "/api/fonteEmissao", source, "Erro ao cadastrar fonte.")
            .await
    }

    pub async fn update_source(&self, id: &EntityId, source: &SourcePayload) -> Result<(), ApiError> {
        self.send_json(
            Method::PUT,
            &format!("/api/fonteEmissao/{id}"),
            source,
            "Erro ao atualizar fonte.",
        )
        .await
    }

    pub async fn delete_source(&self, id: &EntityId) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/api/fonteEmissao/{id}"))
            .send()
            .await?;
        ensure_success(response, "Erro ao excluir fonte.").await?;
        Ok(())
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.get_json("/api/projeto", "Erro ao buscar projetos").await
    }

    pub async fn get_project(&self, id: &EntityId) -> Result<Project, ApiError> {
        self.get_json(&format!("/api/projeto/{id}"), "Erro ao buscar dados do projeto")
            .await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<(), ApiError> {
        self.send_json(Method::POST, "/api/projeto", project, "Erro ao cadastrar projeto.")
            .await
    }

    pub async fn update_project(&self, id: &EntityId, update: &ProjectUpdate) -> Result<(), ApiError> {
        self.send_json(
            Method::PUT,
            &format!("/api/projeto/{id}"),
            update,
            "Erro ao atualizar projeto",
        )
        .await
    }

    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        self.get_json("/api/transacao", "Erro ao buscar transações").await
    }

    pub async fn create_transaction(&self, transaction: &NewTransaction) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            "/api/transacao",
            transaction,
            "Erro ao registrar transação",
        )
        .await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        debug!("{method} {path}");
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, fallback: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path).send().await?;
        let response = ensure_success(response, fallback).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            warn!("undecodable response from {path}: {err}");
            ApiError::Decode(err.to_string())
        })
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<(), ApiError> {
        let response = self.request(method, path).json(body).send().await?;
        ensure_success(response, fallback).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response, fallback: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!("backend answered {status} for {url}: {body}");
    Err(ApiError::from_response(status, &body, fallback))
}
