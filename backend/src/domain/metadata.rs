//! Client metadata catalog: languages, user statuses, and the localised
//! text for every response code.
//!
//! The catalog is normally loaded from the `metadata.json` blob. When that
//! blob is missing, [`Metadata::builtin`] supplies English and Spanish texts
//! so envelopes always carry a readable message.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Language, ResponseCode, UserStatus};

/// Text returned for codes the catalog does not describe.
pub const MISSING_TEXT: &str = "{no code defined for this error}";

/// One string per supported language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LocalizedText {
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es: Option<String>,
}

impl LocalizedText {
    fn pair(en: &str, es: &str) -> Self {
        Self {
            en: Some(en.to_owned()),
            es: Some(es.to_owned()),
        }
    }

    /// Text for `language`; Spanish falls back to English when absent.
    pub fn get(&self, language: Language) -> Option<&str> {
        match language {
            Language::Es => self.es.as_deref().or(self.en.as_deref()),
            Language::En => self.en.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCodeText {
    pub response_code: ResponseCode,
    pub text: LocalizedText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnumText {
    #[serde(rename = "enum")]
    pub name: String,
    pub sequence: i32,
    pub text: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<LocalizedText>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusText {
    pub user_status_id: UserStatus,
    pub sequence: i32,
    pub text: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<LocalizedText>,
}

/// Loaded catalog. Also the payload of `data.Metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub languages: Vec<EnumText>,
    #[serde(default)]
    pub response_codes: Vec<ResponseCodeText>,
    #[serde(default)]
    pub user_status: Vec<UserStatusText>,
}

impl Metadata {
    /// Localised text for `code`, or [`MISSING_TEXT`].
    ///
    /// # Examples
    /// ```
    /// use sitehub::domain::{Language, Metadata, ResponseCode};
    ///
    /// let catalog = Metadata::builtin();
    /// assert!(!catalog.text_for(ResponseCode::EmailUnavailable, Language::Es).is_empty());
    /// ```
    pub fn text_for(&self, code: ResponseCode, language: Language) -> String {
        self.response_codes
            .iter()
            .find(|entry| entry.response_code == code)
            .and_then(|entry| entry.text.get(language))
            .unwrap_or(MISSING_TEXT)
            .to_owned()
    }

    /// Client view with user statuses in display order.
    pub fn view(&self) -> Self {
        let mut view = self.clone();
        view.user_status.sort_by_key(|status| status.sequence);
        view
    }

    /// Catalog compiled into the binary.
    pub fn builtin() -> Self {
        let response_codes = ResponseCode::ALL
            .iter()
            .map(|code| {
                let (en, es) = builtin_text(*code);
                ResponseCodeText {
                    response_code: *code,
                    text: LocalizedText::pair(en, es),
                }
            })
            .collect();
        let languages = vec![
            EnumText {
                name: Language::En.as_str().to_owned(),
                sequence: 0,
                text: LocalizedText::pair("English", "Inglés"),
                note: None,
            },
            EnumText {
                name: Language::Es.as_str().to_owned(),
                sequence: 1,
                text: LocalizedText::pair("Spanish", "Español"),
                note: None,
            },
        ];
        let user_status = [
            (UserStatus::Registered, "Registered", "Registrado"),
            (UserStatus::Verified, "Verified", "Verificado"),
            (UserStatus::Active, "Active", "Activo"),
            (UserStatus::Suspended, "Suspended", "Suspendido"),
            (UserStatus::Closed, "Closed", "Cerrado"),
        ]
        .into_iter()
        .zip(1..)
        .map(|((status, en, es), sequence)| UserStatusText {
            user_status_id: status,
            sequence,
            text: LocalizedText::pair(en, es),
            caption: None,
        })
        .collect();
        Self {
            languages,
            response_codes,
            user_status,
        }
    }
}

fn builtin_text(code: ResponseCode) -> (&'static str, &'static str) {
    match code {
        ResponseCode::Ok => ("Success", "Éxito"),
        ResponseCode::SiteDown => (
            "The site is temporarily unavailable",
            "El sitio no está disponible temporalmente",
        ),
        ResponseCode::NoData => ("No data was found", "No se encontraron datos"),
        ResponseCode::NotFound => ("Not found", "No encontrado"),
        ResponseCode::InvalidParameter => (
            "A required value is missing or invalid",
            "Falta un valor obligatorio o no es válido",
        ),
        ResponseCode::Loading => (
            "The site is loading, please try again shortly",
            "El sitio se está cargando, inténtelo de nuevo en breve",
        ),
        ResponseCode::NotLoaded => ("The site is not loaded", "El sitio no está cargado"),
        ResponseCode::InvalidVersion => (
            "Please refresh to get the latest version",
            "Actualice para obtener la última versión",
        ),
        ResponseCode::Maintenance => (
            "The site is down for maintenance",
            "El sitio está en mantenimiento",
        ),
        ResponseCode::Duplicate => ("That record already exists", "Ese registro ya existe"),
        ResponseCode::EmailUnavailable => (
            "That email address is not available",
            "Esa dirección de correo no está disponible",
        ),
        ResponseCode::InvalidCredentials => (
            "The email or password is incorrect",
            "El correo o la contraseña son incorrectos",
        ),
        ResponseCode::InvalidEmailAddress => (
            "That email address is not valid",
            "Esa dirección de correo no es válida",
        ),
        ResponseCode::InvalidEmailVerificationCode => (
            "The verification code is not valid",
            "El código de verificación no es válido",
        ),
        ResponseCode::EmailVerificationCodeExpired => (
            "The verification email has expired. Please request another one before continuing",
            "El correo de verificación ha caducado. Solicite otro antes de continuar",
        ),
        ResponseCode::StoragePreconditionFailed => (
            "The record was changed by someone else, please try again",
            "Otra persona modificó el registro, inténtelo de nuevo",
        ),
        ResponseCode::InsufficientPermissionMember => (
            "You do not have permission to do that",
            "No tiene permiso para hacer eso",
        ),
        ResponseCode::InternalDatabaseDown
        | ResponseCode::InternalDatabaseError
        | ResponseCode::InternalUnhandledError => (
            "Something went wrong on our side, please try again",
            "Algo salió mal de nuestro lado, inténtelo de nuevo",
        ),
        ResponseCode::ProviderDown | ResponseCode::ProviderError => (
            "A service we depend on is unavailable, please try again",
            "Un servicio del que dependemos no está disponible, inténtelo de nuevo",
        ),
        ResponseCode::NotImplemented => ("That is not available yet", "Eso aún no está disponible"),
    }
}
