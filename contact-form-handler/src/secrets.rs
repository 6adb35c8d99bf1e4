use crate::EnvironmentError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::{de::DeserializeOwned, Deserialize};

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn open() -> Self;

    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, lambda_http::Error>;
}

/// Credentials which may be kept in the secret store instead of the function's environment.
#[derive(Deserialize, Default, Debug)]
pub struct ContactSecrets {
    #[serde(rename = "SMTP_USERNAME", default)]
    pub smtp_username: Option<String>,
    #[serde(rename = "SMTP_PASSWORD", default)]
    pub smtp_password: Option<String>,
    #[serde(rename = "RECAPTCHA_SECRET_KEY", default)]
    pub captcha_secret: Option<String>,
}

pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn open() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&config);
        Self(secrets_client)
    }

    async fn get_secret<T: DeserializeOwned>(&self, name: &str) -> Result<T, lambda_http::Error> {
        let secret = self.0.get_secret_value().secret_id(name).send().await?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(Box::new(EnvironmentError::MissingSecret(name.into())));
        };
        Ok(serde_json::from_str(secret_value)?)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::SecretRepository;
    use crate::EnvironmentError;
    use async_trait::async_trait;
    use serde::de::DeserializeOwned;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeSecretRepository(HashMap<String, String>);

    impl FakeSecretRepository {
        pub fn with_secret(mut self, name: &str, value: impl Into<String>) -> Self {
            self.0.insert(name.into(), value.into());
            self
        }
    }

    #[async_trait]
    impl SecretRepository for FakeSecretRepository {
        async fn open() -> Self {
            Self::default()
        }

        async fn get_secret<T: DeserializeOwned>(
            &self,
            name: &str,
        ) -> std::result::Result<T, lambda_http::Error> {
            let string_value = self
                .0
                .get(name)
                .ok_or(EnvironmentError::MissingSecret(name.into()))?;
            Ok(serde_json::from_str(string_value)?)
        }
    }
}
