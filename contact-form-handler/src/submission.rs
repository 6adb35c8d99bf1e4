use crate::ContactFormError;
use serde::Deserialize;
use tracing::info;

/// Request body as posted by the contact form. Every field is optional on the wire so that a
/// missing field is reported as such instead of as malformed JSON.
#[derive(Deserialize, Debug, Default)]
pub struct ContactFormSubmission {
    name: Option<String>,
    email: Option<String>,
    company: Option<String>,
    project: Option<String>,
    message: Option<String>,
    #[serde(rename = "g-recaptcha-response")]
    captcha_token: Option<String>,
}

impl ContactFormSubmission {
    pub fn parse(body: &[u8]) -> Result<Self, ContactFormError> {
        serde_json::from_slice(body)
            .map_err(|error| ContactFormError::MalformedInput(error.to_string()))
    }

    /// Checks that name, email and message are present. The email address is deliberately not
    /// checked for format.
    pub fn validate(&self) -> Result<ValidatedSubmission, ContactFormError> {
        let (Some(name), Some(email), Some(message)) = (
            non_blank(&self.name),
            non_blank(&self.email),
            non_blank(&self.message),
        ) else {
            return Err(ContactFormError::MissingRequiredField);
        };

        Ok(ValidatedSubmission {
            name,
            email,
            company: non_blank(&self.company),
            project: non_blank(&self.project),
            message,
            captcha_token: non_blank(&self.captcha_token),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, PartialEq)]
pub struct ValidatedSubmission<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub company: Option<&'a str>,
    pub project: Option<&'a str>,
    pub message: &'a str,
    pub captcha_token: Option<&'a str>,
}

impl<'a> ValidatedSubmission<'a> {
    pub fn subject(&self) -> String {
        match self.company {
            Some(company) => format!("Project Inquiry from {} ({company})", self.name),
            None => format!("Project Inquiry from {}", self.name),
        }
    }

    pub fn log(&self) {
        info!(
            name = self.name,
            email = self.email,
            company = self.company.unwrap_or("Not provided"),
            project = self.project.unwrap_or("Not selected"),
            message = self.message,
            "New contact form submission"
        );
    }
}
