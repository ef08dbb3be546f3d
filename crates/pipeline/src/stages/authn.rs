use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::realm::Authenticator;
use crate::stages::Stage;

pub struct AuthenticationStage {
    pub authenticator: Arc<dyn Authenticator>,
    pub realm: String,
}

#[async_trait]
impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let Some(authorization) = ex.header("Authorization").map(str::to_string) else {
            return Ok(());
        };
        match self.authenticator.authenticate(&authorization).await {
            Ok(account) => {
                debug!(
                    request_id = %ex.request_id,
                    user = account.as_ref().map(|a| a.name.as_str()),
                    "authenticated"
                );
                ex.account = account;
            }
            Err(err) => {
                ex.set_header("WWW-Authenticate", &challenge(&self.realm));
                ex.set_error(err);
            }
        }
        Ok(())
    }
}

pub(crate) fn challenge(realm: &str) -> String {
    format!("Basic realm=\"{realm}\"")
}
