//! Email and SMS templates with `{Name}` placeholder substitution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::Error;

/// Email templates the account core renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailTemplateId {
    Test,
    EmailVerification,
    EmailChanged,
    ResetPassword,
}

/// Stored email template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub template_id: EmailTemplateId,
    pub subject: String,
    /// Optional HTML body; preferred over `text` when present.
    #[serde(default)]
    pub html: Option<String>,
    pub text: String,
}

/// Stored SMS template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsTemplate {
    pub template_id: String,
    pub text: String,
}

/// Email ready for the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
    pub html: bool,
}

/// Replace every `{Name}` in `source` from `parameters`.
///
/// Unresolved placeholders are collected rather than left in the output.
///
/// # Examples
/// ```
/// use std::collections::BTreeMap;
/// use sitehub::domain::templates::substitute;
///
/// let params = BTreeMap::from([("Name".to_owned(), "Ada".to_owned())]);
/// assert_eq!(substitute("Hi {Name}", &params), Ok("Hi Ada".to_owned()));
/// assert_eq!(substitute("{Missing}", &params), Err(vec!["Missing".to_owned()]));
/// ```
pub fn substitute(
    source: &str,
    parameters: &BTreeMap<String, String>,
) -> Result<String, Vec<String>> {
    let mut output = String::with_capacity(source.len());
    let mut missing = Vec::new();
    let mut rest = source;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}');
        let nested = after.find('{');
        match close {
            Some(close) if nested.is_none_or(|nested| nested > close) => {
                let name = &after[..close];
                match parameters.get(name) {
                    Some(value) => output.push_str(value),
                    None if name.trim().is_empty() => {
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                    None => {
                        if !missing.iter().any(|known| known == name) {
                            missing.push(name.to_owned());
                        }
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    if missing.is_empty() {
        Ok(output)
    } else {
        Err(missing)
    }
}

impl EmailTemplate {
    /// Render subject and body.
    pub fn render(&self, parameters: &BTreeMap<String, String>) -> Result<RenderedEmail, Error> {
        let (source, html) = match &self.html {
            Some(html) if !html.trim().is_empty() => (html.as_str(), true),
            _ => (self.text.as_str(), false),
        };
        let subject = substitute(&self.subject, parameters);
        let body = substitute(source, parameters);
        match (subject, body) {
            (Ok(subject), Ok(body)) => Ok(RenderedEmail {
                subject,
                body,
                html,
            }),
            (subject, body) => {
                let mut missing = subject.err().unwrap_or_default();
                missing.extend(body.err().unwrap_or_default());
                Err(Error::provider(format!(
                    "template {:?} has unresolved parameters: {}",
                    self.template_id,
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Loaded email templates keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailTemplates(BTreeMap<String, EmailTemplate>);

impl EmailTemplates {
    fn key(id: EmailTemplateId) -> String {
        format!("{id:?}")
    }

    /// Index a list; later entries win.
    pub fn from_list(templates: Vec<EmailTemplate>) -> Self {
        Self(
            templates
                .into_iter()
                .map(|template| (Self::key(template.template_id), template))
                .collect(),
        )
    }

    pub fn get(&self, id: EmailTemplateId) -> Option<&EmailTemplate> {
        self.0.get(&Self::key(id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Templates compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_list(vec![
            EmailTemplate {
                template_id: EmailTemplateId::EmailVerification,
                subject: "Please verify your email address".to_owned(),
                html: None,
                text: "Hi {DisplayName},\n\nPlease confirm your email address by visiting \
                       {EmailVerificationUrl}\n\nIf you did not sign up at {HomeUrl}, please \
                       tell us at {PhishingUrl}.\n"
                    .to_owned(),
            },
            EmailTemplate {
                template_id: EmailTemplateId::EmailChanged,
                subject: "Your email address was changed".to_owned(),
                html: None,
                text: "Hi {DisplayName},\n\nThe email address on your account was changed to \
                       {NewEmail}. If you did not make this change, please tell us at \
                       {PhishingUrl}.\n"
                    .to_owned(),
            },
        ])
    }
}

/// Loaded SMS templates keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsTemplates(BTreeMap<String, SmsTemplate>);

impl SmsTemplates {
    pub fn from_list(templates: Vec<SmsTemplate>) -> Self {
        Self(
            templates
                .into_iter()
                .map(|template| (template.template_id.clone(), template))
                .collect(),
        )
    }

    pub fn get(&self, id: &str) -> Option<&SmsTemplate> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("{A}{B}", "12")]
    #[case("{A} and {A}", "1 and 1")]
    #[case("brace { alone", "brace { alone")]
    #[case("{ }", "{ }")]
    #[case("{{A}}", "{1}}")]
    fn substitutes_known_names(#[case] source: &str, #[case] expected: &str) {
        let rendered = substitute(source, &params(&[("A", "1"), ("B", "2")]));
        assert_eq!(rendered.as_deref(), Ok(expected));
    }

    #[test]
    fn reports_each_missing_name_once() {
        let err = substitute("{X} {Y} {X}", &params(&[])).expect_err("missing names");
        assert_eq!(err, vec!["X".to_owned(), "Y".to_owned()]);
    }

    #[test]
    fn builtin_verification_template_renders() {
        let templates = EmailTemplates::builtin();
        let template = templates
            .get(EmailTemplateId::EmailVerification)
            .expect("builtin template");
        let rendered = template
            .render(&params(&[
                ("DisplayName", "Jane"),
                ("EmailVerificationUrl", "http://x/verify?code=abc"),
                ("HomeUrl", "http://x/"),
                ("PhishingUrl", "http://x/phishing"),
            ]))
            .expect("renders");
        assert!(rendered.body.contains("http://x/verify?code=abc"));
        assert!(!rendered.html);
    }

    #[test]
    fn unresolved_parameters_are_provider_errors() {
        let template = EmailTemplate {
            template_id: EmailTemplateId::Test,
            subject: "{Subject}".to_owned(),
            html: None,
            text: "{Body}".to_owned(),
        };
        let err = template.render(&params(&[])).expect_err("unresolved");
        assert_eq!(err.code(), crate::domain::ResponseCode::ProviderError);
        assert!(err.message().contains("Subject, Body"));
    }
}
