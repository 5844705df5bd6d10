//! Login, registration and the profile screen.

use crate::errors::{ApiError, AppError};
use crate::gateway::{Backend, Gateway};
use crate::models::{CurrentUser, EntityId, RegisterPayload, UserUpdate, token_from_login_payload};
use crate::registry::Entropy;
use crate::session::SessionStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(&str, &str), ApiError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ApiError::validation("Por favor, preencha o e-mail."));
        }
        if self.password.trim().is_empty() {
            return Err(ApiError::validation("Por favor, preencha a senha."));
        }
        Ok((email, &self.password))
    }
}

/// Authenticates and opens a 24h session. A response without a token still
/// logs the user in; backend calls then go out unauthenticated.
pub async fn login(gateway: &Gateway, session: &SessionStore, form: &LoginForm) -> Result<CurrentUser, AppError> {
    let (email, password) = form.validate()?;
    let payload = gateway.login(email, password).await?;
    let user = CurrentUser::from_login_payload(&payload)
        .ok_or_else(|| ApiError::Decode("resposta de login sem identificador do usuário".into()))?;
    let token = token_from_login_payload(&payload);
    if token.is_none() {
        warn!("login for {} returned no token", user.email);
    }
    session.establish(user.clone(), token).await?;
    info!("user {} logged in", user.id);
    Ok(user)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<RegisterPayload<'_>, ApiError> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Por favor, preencha o nome completo."));
        }
        if email.is_empty() {
            return Err(ApiError::validation("Por favor, preencha o e-mail."));
        }
        if self.profile.is_empty() {
            return Err(ApiError::validation("Por favor, selecione um perfil."));
        }
        if self.password.is_empty() {
            return Err(ApiError::validation("Por favor, preencha a senha."));
        }
        if self.confirm_password.is_empty() {
            return Err(ApiError::validation("Por favor, confirme a senha."));
        }
        if self.password != self.confirm_password {
            return Err(ApiError::validation("As senhas não coincidem."));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation("A senha deve ter pelo menos 6 caracteres."));
        }
        Ok(RegisterPayload {
            nome: name,
            email,
            perfil: &self.profile,
            senha: &self.password,
        })
    }
}

pub async fn register(gateway: &Gateway, form: &RegisterForm) -> Result<(), ApiError> {
    let payload = form.validate()?;
    gateway.register(&payload).await?;
    info!("registered {}", payload.email);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub user: CurrentUser,
    pub token_balance: Option<i64>,
    pub loaded_from_backend: bool,
}

/// Fetches the profile, falling back to the stored copy. A fetched name and
/// email replace the stored ones; company and wallet stay local when set.
pub async fn load_profile(backend: &Backend, session: &SessionStore, stored: &CurrentUser) -> ProfileView {
    match backend.get_user(&stored.id).await {
        Ok(remote) => {
            let mut user = stored.clone();
            if !remote.name.is_empty() {
                user.name = remote.name.clone();
            }
            if !remote.email.is_empty() {
                user.email = remote.email.clone();
            }
            if user.company.is_empty() {
                user.company = remote.company.clone();
            }
            if user.wallet_address.is_empty() {
                user.wallet_address = remote.wallet_address.clone();
            }
            let refreshed = user.clone();
            if let Err(err) = session.update_user(move |current| *current = refreshed).await {
                warn!("failed to store refreshed profile: {}", err.message);
            }
            ProfileView {
                user,
                token_balance: Some(remote.token_balance),
                loaded_from_backend: true,
            }
        }
        Err(err) => {
            warn!("using stored profile, fetch failed: {err}");
            ProfileView {
                user: stored.clone(),
                token_balance: None,
                loaded_from_backend: false,
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<UserUpdate, ApiError> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Por favor, preencha o nome."));
        }
        if email.is_empty() {
            return Err(ApiError::validation("Por favor, preencha o e-mail."));
        }
        Ok(UserUpdate {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..UserUpdate::default()
        })
    }
}

pub async fn update_profile(
    backend: &Backend,
    session: &SessionStore,
    user_id: &EntityId,
    form: &ProfileForm,
) -> Result<(), AppError> {
    let update = form.validate()?;
    backend.update_user(user_id, &update).await?;
    session
        .update_user(|user| {
            user.name = update.name.clone().unwrap_or_default();
            user.email = update.email.clone().unwrap_or_default();
        })
        .await?;
    info!("profile of {user_id} updated");
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl PasswordForm {
    pub fn validate(&self) -> Result<UserUpdate, ApiError> {
        if self.current_password.is_empty() {
            return Err(ApiError::validation("Por favor, informe sua senha atual."));
        }
        if self.new_password.is_empty() {
            return Err(ApiError::validation("Por favor, informe a nova senha."));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation("A nova senha deve ter pelo menos 6 caracteres."));
        }
        if self.new_password != self.confirm_password {
            return Err(ApiError::validation("As senhas não coincidem."));
        }
        if self.current_password == self.new_password {
            return Err(ApiError::validation("A nova senha deve ser diferente da senha atual."));
        }
        Ok(UserUpdate {
            current_password: Some(self.current_password.clone()),
            new_password: Some(self.new_password.clone()),
            ..UserUpdate::default()
        })
    }
}

pub async fn change_password(backend: &Backend, user_id: &EntityId, form: &PasswordForm) -> Result<(), ApiError> {
    let update = form.validate()?;
    backend.change_password(user_id, &update).await?;
    info!("password of {user_id} changed");
    Ok(())
}

/// Simulated wallet connection: a random address kept only in the local profile.
pub async fn connect_wallet(session: &SessionStore, entropy: &dyn Entropy) -> Result<String, AppError> {
    let address = format!("0x{}", entropy.hex(40));
    let stored = address.clone();
    session.update_user(move |user| user.wallet_address = stored).await?;
    info!("wallet connected: {address}");
    Ok(address)
}
