use crate::auth::{self, LoginForm, PasswordForm, ProfileForm, RegisterForm};
use crate::compensation::{self, CompensationForm, CompensationProject, CompensationView};
use crate::conversion::SourceCategory;
use crate::errors::{ApiError, AppError};
use crate::gateway::Backend;
use crate::models::EntityId;
use crate::monitoring::{self, Calculation, EmissionForm, MonitoringView, SourceForm};
use crate::notifications::{NoticeKind, Priority, ReadFilter};
use crate::registry::{self, HashVerification, Network, RegistryRecord};
use crate::session::{ActiveSession, SessionStatus};
use crate::state::{AppState, ToastKind};
use crate::stats::{self, DashboardStats};
use crate::tokenization::{self, BuyForm, IssueForm, NewProjectForm, TokenizationView};
use crate::format;
use crate::ui::{self, PageChrome};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Local;
use serde::Deserialize;
use tracing::{error, warn};

/// A logged-in user for page routes. Anonymous or expired sessions are sent
/// to the login page.
pub struct Authenticated {
    pub session: ActiveSession,
    pub backend: Backend,
}

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = Redirect;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.backend().await {
            Ok((session, backend)) => Ok(Self { session, backend }),
            Err(err) => {
                if matches!(err, ApiError::SessionExpired) {
                    state.flash(ToastKind::Error, err.to_string()).await;
                }
                Err(Redirect::to("/login"))
            }
        }
    }
}

/// Same as [`Authenticated`] for JSON routes, rejecting with 401.
pub struct ApiSession {
    pub session: ActiveSession,
    pub backend: Backend,
}

#[async_trait]
impl FromRequestParts<AppState> for ApiSession {
    type Rejection = AppError;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (session, backend) = state.backend().await?;
        Ok(Self { session, backend })
    }
}

async fn chrome(state: &AppState, session: &ActiveSession) -> PageChrome {
    let unread = state.notifications.lock().await.counts().unread;
    PageChrome {
        user_name: session.user.name.clone(),
        unread,
        toast: state.take_toast().await,
    }
}

/// Flashes the outcome of an action and sends the browser back to `to`.
async fn finish<E>(state: &AppState, outcome: Result<String, E>, to: &str) -> Redirect
where
    E: Into<AppError>,
{
    match outcome {
        Ok(message) => state.flash(ToastKind::Success, message).await,
        Err(err) => {
            let err: AppError = err.into();
            if err.status.is_server_error() {
                error!("action on {to} failed: {}", err.message);
            }
            state.flash(ToastKind::Error, err.message).await;
        }
    }
    Redirect::to(to)
}

fn csv_download(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn parse_id(raw: &str) -> Result<EntityId, AppError> {
    EntityId::new(raw).ok_or_else(|| AppError::bad_request("Identificador inválido."))
}

// auth

pub async fn root(State(state): State<AppState>) -> Redirect {
    match state.session.status().await {
        SessionStatus::Active(_) => Redirect::to("/dashboard"),
        _ => Redirect::to("/login"),
    }
}

pub async fn login_page(State(state): State<AppState>) -> Response {
    if let SessionStatus::Active(_) = state.session.status().await {
        return Redirect::to("/dashboard").into_response();
    }
    let toast = state.take_toast().await;
    Html(ui::render_login(toast.as_ref())).into_response()
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Redirect {
    match auth::login(&state.gateway, &state.session, &form).await {
        Ok(_) => {
            state.flash(ToastKind::Success, "Login realizado com sucesso!").await;
            Redirect::to("/dashboard")
        }
        Err(err) => {
            warn!("login failed: {}", err.message);
            state.flash(ToastKind::Error, err.message).await;
            Redirect::to("/login")
        }
    }
}

pub async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Redirect {
    let outcome = auth::register(&state.gateway, &form)
        .await
        .map(|()| "Cadastro realizado com sucesso! Faça login para continuar.".to_string());
    finish(&state, outcome, "/login").await
}

pub async fn logout(State(state): State<AppState>) -> Redirect {
    let outcome = state
        .session
        .clear()
        .await
        .map(|()| "Logout realizado com sucesso!".to_string());
    finish(&state, outcome, "/login").await
}

// dashboard

pub async fn dashboard_page(State(state): State<AppState>, ctx: Authenticated) -> Html<String> {
    let stats = stats::load_dashboard(&ctx.backend, &ctx.session.user.id).await;
    let chrome = chrome(&state, &ctx.session).await;
    Html(ui::render_dashboard(&chrome, &stats))
}

pub async fn dashboard_data(ctx: ApiSession) -> Json<DashboardStats> {
    Json(stats::load_dashboard(&ctx.backend, &ctx.session.user.id).await)
}

// monitoring

pub async fn monitoring_page(State(state): State<AppState>, ctx: Authenticated) -> Html<String> {
    let view = monitoring::load_view(&ctx.backend, &ctx.session.user.id).await;
    let chrome = chrome(&state, &ctx.session).await;
    Html(ui::render_monitoring(&chrome, &view))
}

pub async fn monitoring_data(ctx: ApiSession) -> Json<MonitoringView> {
    Json(monitoring::load_view(&ctx.backend, &ctx.session.user.id).await)
}

#[derive(Debug, Deserialize)]
pub struct CalculateQuery {
    pub category: SourceCategory,
    #[serde(default)]
    pub consumption: String,
    #[serde(default)]
    pub source_id: String,
}

/// Live calculator: emissions for a consumption and the selected source.
pub async fn calculate_emission(
    ctx: ApiSession,
    Query(query): Query<CalculateQuery>,
) -> Result<Json<Calculation>, AppError> {
    let description = match EntityId::new(query.source_id.as_str()) {
        Some(id) => ctx
            .backend
            .list_sources()
            .await?
            .into_iter()
            .find(|source| source.id.as_ref() == Some(&id))
            .map(|source| source.description)
            .unwrap_or_default(),
        None => String::new(),
    };
    let consumption = monitoring::parse_quantity(&query.consumption);
    Ok(Json(monitoring::calculate(query.category, consumption, &description)))
}

pub async fn record_emission(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<EmissionForm>,
) -> Redirect {
    let outcome = monitoring::record_emission(&ctx.backend, &ctx.session.user.id, &form)
        .await
        .map(|calculation| match calculation.category {
            SourceCategory::Energy => "Emissão de energia registrada com sucesso!".to_string(),
            SourceCategory::Fleet => "Emissão de frota registrada com sucesso!".to_string(),
        });
    finish(&state, outcome, "/monitoring").await
}

pub async fn create_source(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<SourceForm>,
) -> Redirect {
    let outcome = monitoring::create_source(&ctx.backend, &form)
        .await
        .map(|()| "Fonte criada com sucesso!".to_string());
    finish(&state, outcome, "/monitoring").await
}

pub async fn update_source(
    State(state): State<AppState>,
    ctx: Authenticated,
    Path(id): Path<String>,
    Form(form): Form<SourceForm>,
) -> Redirect {
    let outcome = match parse_id(&id) {
        Ok(id) => monitoring::update_source(&ctx.backend, &id, &form)
            .await
            .map(|()| "Fonte atualizada com sucesso!".to_string())
            .map_err(AppError::from),
        Err(err) => Err(err),
    };
    finish(&state, outcome, "/monitoring").await
}

pub async fn delete_source(State(state): State<AppState>, ctx: Authenticated, Path(id): Path<String>) -> Redirect {
    let outcome = match parse_id(&id) {
        Ok(id) => monitoring::delete_source(&ctx.backend, &id)
            .await
            .map(|()| "Fonte excluída com sucesso!".to_string())
            .map_err(AppError::from),
        Err(err) => Err(err),
    };
    finish(&state, outcome, "/monitoring").await
}

// tokenization

pub async fn tokenization_page(State(state): State<AppState>, ctx: Authenticated) -> Html<String> {
    let view = tokenization::load_view(&ctx.backend, &ctx.session.user.id).await;
    let chrome = chrome(&state, &ctx.session).await;
    Html(ui::render_tokenization(&chrome, &view))
}

pub async fn tokenization_data(ctx: ApiSession) -> Json<TokenizationView> {
    Json(tokenization::load_view(&ctx.backend, &ctx.session.user.id).await)
}

pub async fn export_token_history(State(state): State<AppState>, ctx: Authenticated) -> Response {
    let view = tokenization::load_view(&ctx.backend, &ctx.session.user.id).await;
    state.flash(ToastKind::Success, "Histórico exportado com sucesso!").await;
    csv_download("historico-tokens.csv", tokenization::history_csv(&view.history))
}

pub async fn create_project(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<NewProjectForm>,
) -> Redirect {
    let outcome = tokenization::create_project(&ctx.backend, &form)
        .await
        .map(|()| "Projeto cadastrado com sucesso!".to_string());
    finish(&state, outcome, "/tokenization").await
}

pub async fn issue_tokens(State(state): State<AppState>, ctx: Authenticated, Form(form): Form<IssueForm>) -> Redirect {
    let outcome = async {
        let issuance = tokenization::issue_tokens(
            &ctx.backend,
            &ctx.session.user.id,
            &form,
            state.config.emission_link_max_co2,
        )
        .await?;
        let project = ctx
            .backend
            .get_project(&issuance.project_id)
            .await
            .map(|project| project.name)
            .unwrap_or_else(|_| "o projeto".to_string());
        Ok::<_, ApiError>(format!("{} tokens emitidos com sucesso para {project}!", issuance.tokens))
    }
    .await;
    finish(&state, outcome, "/tokenization").await
}

pub async fn buy_tokens(State(state): State<AppState>, ctx: Authenticated, Form(form): Form<BuyForm>) -> Redirect {
    let outcome = async {
        let purchase = tokenization::buy_tokens(
            &ctx.backend,
            &ctx.session.user.id,
            &form,
            state.config.emission_link_max_co2,
        )
        .await?;
        let project = ctx
            .backend
            .get_project(&purchase.project_id)
            .await
            .map(|project| project.name)
            .unwrap_or_default();
        Ok::<_, ApiError>(format!(
            "Compra de {} tokens de \"{project}\" realizada com sucesso!",
            purchase.amount
        ))
    }
    .await;
    finish(&state, outcome, "/tokenization").await
}

// compensation

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn compensation_page(
    State(state): State<AppState>,
    ctx: Authenticated,
    Query(query): Query<SearchQuery>,
) -> Html<String> {
    let view = compensation::load_view(&ctx.backend, &ctx.session.user.id).await;
    let search: Option<(String, Vec<CompensationProject>)> = match query.q.as_deref() {
        Some(q) => match compensation::search_projects(&view.projects, q) {
            Ok(found) => Some((q.trim().to_string(), found.into_iter().cloned().collect())),
            Err(err) => {
                state.flash(ToastKind::Error, err.to_string()).await;
                None
            }
        },
        None => None,
    };
    let chrome = chrome(&state, &ctx.session).await;
    Html(ui::render_compensation(&chrome, &view, search.as_ref()))
}

pub async fn compensation_data(ctx: ApiSession) -> Json<CompensationView> {
    Json(compensation::load_view(&ctx.backend, &ctx.session.user.id).await)
}

pub async fn compensate(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<CompensationForm>,
) -> Redirect {
    let outcome = compensation::compensate(&ctx.backend, &ctx.session.user.id, &form).await;
    if let Ok(receipt) = &outcome {
        state.notifications.lock().await.push(
            NoticeKind::Success,
            Priority::Low,
            "Compensação realizada com sucesso",
            &format!(
                "Sua compensação de {} kg CO₂ com {} foi registrada.",
                format::number(receipt.co2_kg),
                receipt.project_name
            ),
            Some("/compensation"),
        );
    }
    let outcome = outcome.map(|receipt| {
        format!(
            "Compensação de {} kg CO₂ realizada com sucesso!",
            format::number(receipt.co2_kg)
        )
    });
    finish(&state, outcome, "/compensation").await
}

pub async fn export_compensations(State(state): State<AppState>, ctx: Authenticated) -> Response {
    let view = compensation::load_view(&ctx.backend, &ctx.session.user.id).await;
    state.flash(ToastKind::Success, "Histórico exportado com sucesso!").await;
    csv_download("historico-compensacoes.csv", compensation::history_csv(&view.history))
}

// registry

#[derive(Debug, Default, Deserialize)]
pub struct RegistryQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HashForm {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub network: String,
}

async fn render_registry(
    state: &AppState,
    ctx: &Authenticated,
    query: &RegistryQuery,
    check: Option<&HashVerification>,
) -> Html<String> {
    let network = Network::parse(query.network.as_deref().unwrap_or_default());
    let search = query.q.as_deref().unwrap_or_default();
    let registry = state.registry.lock().await;
    let records: Vec<&RegistryRecord> = if search.trim().is_empty() {
        registry.records().iter().collect()
    } else {
        match registry.search(search) {
            Ok(found) => found,
            Err(err) => {
                state.flash(ToastKind::Error, err.to_string()).await;
                registry.records().iter().collect()
            }
        }
    };
    let summary = registry.summary();
    let chrome = chrome(state, &ctx.session).await;
    Html(ui::render_registry(&chrome, &records, &summary, network, search, check))
}

pub async fn registry_page(
    State(state): State<AppState>,
    ctx: Authenticated,
    Query(query): Query<RegistryQuery>,
) -> Html<String> {
    render_registry(&state, &ctx, &query, None).await
}

pub async fn verify_record(State(state): State<AppState>, _ctx: Authenticated, Path(hash): Path<String>) -> Redirect {
    let outcome = state
        .registry
        .lock()
        .await
        .verify(&hash, state.entropy.as_ref())
        .map(|_| "Transação verificada e confirmada!".to_string());
    finish(&state, outcome, "/registry").await
}

pub async fn verify_all_records(State(state): State<AppState>, _ctx: Authenticated) -> Redirect {
    let verified = state.registry.lock().await.verify_all(state.entropy.as_ref());
    let message = if verified == 0 {
        "Nenhuma transação pendente.".to_string()
    } else {
        "Todas as transações verificadas!".to_string()
    };
    finish::<AppError>(&state, Ok(message), "/registry").await
}

/// Looks a hash up on the selected network and shows the outcome inline.
pub async fn check_hash(State(state): State<AppState>, ctx: Authenticated, Form(form): Form<HashForm>) -> Response {
    match registry::verify_hash(&form.hash, state.entropy.as_ref()) {
        Ok(result) => {
            let query = RegistryQuery {
                q: None,
                network: Some(form.network),
            };
            render_registry(&state, &ctx, &query, Some(&result)).await.into_response()
        }
        Err(err) => finish(&state, Err::<String, _>(err), "/registry").await.into_response(),
    }
}

// notifications

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn notifications_page(
    State(state): State<AppState>,
    ctx: Authenticated,
    Query(query): Query<NotificationQuery>,
) -> Html<String> {
    let priority = query.priority.as_deref().and_then(Priority::parse);
    let status = query.status.as_deref().map(ReadFilter::parse).unwrap_or_default();
    let chrome = chrome(&state, &ctx.session).await;
    let center = state.notifications.lock().await;
    let items = center.filtered(priority, status);
    Html(ui::render_notifications(
        &chrome,
        &items,
        &center.counts(),
        priority,
        status,
        Local::now().naive_local(),
    ))
}

fn missing_notification() -> AppError {
    AppError::bad_request("Notificação não encontrada.")
}

pub async fn mark_read(State(state): State<AppState>, _ctx: Authenticated, Path(id): Path<u64>) -> Redirect {
    let found = state.notifications.lock().await.set_read(id, true);
    let outcome = found
        .then(|| "Notificação marcada como lida".to_string())
        .ok_or_else(missing_notification);
    finish(&state, outcome, "/notifications").await
}

pub async fn mark_unread(State(state): State<AppState>, _ctx: Authenticated, Path(id): Path<u64>) -> Redirect {
    let found = state.notifications.lock().await.set_read(id, false);
    let outcome = found
        .then(|| "Notificação marcada como não lida".to_string())
        .ok_or_else(missing_notification);
    finish(&state, outcome, "/notifications").await
}

pub async fn mark_all_read(State(state): State<AppState>, _ctx: Authenticated) -> Redirect {
    state.notifications.lock().await.mark_all_read();
    finish::<AppError>(
        &state,
        Ok("Todas as notificações marcadas como lidas".to_string()),
        "/notifications",
    )
    .await
}

pub async fn delete_notification(State(state): State<AppState>, _ctx: Authenticated, Path(id): Path<u64>) -> Redirect {
    let found = state.notifications.lock().await.delete(id);
    let outcome = found
        .then(|| "Notificação excluída".to_string())
        .ok_or_else(missing_notification);
    finish(&state, outcome, "/notifications").await
}

pub async fn clear_notifications(State(state): State<AppState>, _ctx: Authenticated) -> Redirect {
    state.notifications.lock().await.clear();
    finish::<AppError>(
        &state,
        Ok("Todas as notificações foram limpas".to_string()),
        "/notifications",
    )
    .await
}

// profile

pub async fn profile_page(State(state): State<AppState>, ctx: Authenticated) -> Html<String> {
    let view = auth::load_profile(&ctx.backend, &state.session, &ctx.session.user).await;
    let chrome = chrome(&state, &ctx.session).await;
    Html(ui::render_profile(&chrome, &view))
}

pub async fn update_profile(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<ProfileForm>,
) -> Redirect {
    let outcome = auth::update_profile(&ctx.backend, &state.session, &ctx.session.user.id, &form)
        .await
        .map(|()| "Perfil atualizado com sucesso!".to_string());
    finish(&state, outcome, "/profile").await
}

pub async fn change_password(
    State(state): State<AppState>,
    ctx: Authenticated,
    Form(form): Form<PasswordForm>,
) -> Redirect {
    let outcome = auth::change_password(&ctx.backend, &ctx.session.user.id, &form)
        .await
        .map(|()| "Senha alterada com sucesso!".to_string());
    finish(&state, outcome, "/profile").await
}

pub async fn connect_wallet(State(state): State<AppState>, _ctx: Authenticated) -> Redirect {
    let outcome = auth::connect_wallet(&state.session, state.entropy.as_ref())
        .await
        .map(|_| "Carteira conectada com sucesso!".to_string());
    finish(&state, outcome, "/profile").await
}

pub async fn stylesheet() -> Response {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], ui::stylesheet()).into_response()
}
