//! Doctor command for environment diagnostics
//!
//! Checks that the configured models and vector store are reachable.

use colored::Colorize;

use crate::config::{EmbedderKind, MetaragConfig, StoreBackend};
use crate::errors::Result;
use crate::providers::OllamaClient;
use crate::store::QdrantGateway;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// True when `wanted` names one of the installed models; an untagged name
/// matches any tag of that model
pub fn model_installed(installed: &[String], wanted: &str) -> bool {
    installed.iter().any(|name| {
        name == wanted || (!wanted.contains(':') && name.split(':').next() == Some(wanted))
    })
}

/// Diagnostics over one configuration
pub struct Doctor {
    config: MetaragConfig,
}

impl Doctor {
    pub fn new(config: MetaragConfig) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = vec![self.check_config()];

        match self.ollama_client() {
            Ok(client) => {
                let api = self.check_ollama_api(&client).await;
                let reachable = api.status == HealthStatus::Pass;
                checks.push(api);
                if reachable {
                    checks.extend(self.check_models(&client).await);
                }
            }
            Err(e) => checks.push(HealthCheck::new(
                "Ollama API",
                HealthStatus::Fail(format!("Cannot build client: {}", e)),
            )),
        }

        checks.push(self.check_embedder());
        checks.push(self.check_store().await);
        checks
    }

    fn ollama_client(&self) -> Result<OllamaClient> {
        OllamaClient::with_config(
            &self.config.ollama_url(),
            &self.config.ollama.completion_model,
            &self.config.ollama.embedding_model,
            self.config.embedding.dimension,
        )
    }

    fn check_config(&self) -> HealthCheck {
        match self.config.validate() {
            Ok(()) => HealthCheck::new("Configuration", HealthStatus::Pass),
            Err(e) => HealthCheck::new("Configuration", HealthStatus::Fail(e.to_string())),
        }
    }

    async fn check_ollama_api(&self, client: &OllamaClient) -> HealthCheck {
        match client.health_check().await {
            Ok(true) => HealthCheck::new("Ollama API", HealthStatus::Pass),
            Ok(false) => HealthCheck::new(
                "Ollama API",
                HealthStatus::Fail(format!("Not reachable at {}", client.base_url())),
            ),
            Err(e) => HealthCheck::new("Ollama API", HealthStatus::Fail(format!("Error checking Ollama: {}", e))),
        }
    }

    async fn check_models(&self, client: &OllamaClient) -> Vec<HealthCheck> {
        let installed = match client.list_models().await {
            Ok(models) => models,
            Err(e) => {
                return vec![HealthCheck::new(
                    "Models",
                    HealthStatus::Fail(format!("Cannot list models: {}", e)),
                )]
            }
        };

        let mut wanted = vec![("Completion Model", client.completion_model())];
        if self.config.embedding.provider == EmbedderKind::Ollama {
            wanted.push(("Embedding Model", client.embedding_model()));
        }

        wanted
            .into_iter()
            .map(|(name, model)| {
                if model_installed(&installed, model) {
                    HealthCheck::new(name, HealthStatus::Pass)
                } else {
                    HealthCheck::new(
                        name,
                        HealthStatus::Fail(format!("'{}' not installed (ollama pull {})", model, model)),
                    )
                }
            })
            .collect()
    }

    fn check_embedder(&self) -> HealthCheck {
        match self.config.embedding.provider {
            EmbedderKind::Ollama | EmbedderKind::Local => HealthCheck::new("Embedder", HealthStatus::Pass),
            EmbedderKind::Hashing => HealthCheck::new(
                "Embedder",
                HealthStatus::Warn("hashing embedder matches vocabulary only".to_string()),
            ),
        }
    }

    async fn check_store(&self) -> HealthCheck {
        match self.config.retrieval.backend {
            StoreBackend::Memory => HealthCheck::new(
                "Vector Store",
                HealthStatus::Warn("in-memory store, nothing persists between runs".to_string()),
            ),
            StoreBackend::Qdrant => {
                let gateway = match QdrantGateway::connect(&self.config.qdrant.url) {
                    Ok(gateway) => gateway,
                    Err(e) => return HealthCheck::new("Vector Store", HealthStatus::Fail(e.to_string())),
                };
                if gateway.health_check().await {
                    HealthCheck::new("Vector Store", HealthStatus::Pass)
                } else {
                    HealthCheck::new(
                        "Vector Store",
                        HealthStatus::Fail(format!("Qdrant not reachable at {}", gateway.url())),
                    )
                }
            }
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "metarag diagnostics".bold());
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let status = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("{} {}", "WARN".yellow(), msg),
                HealthStatus::Fail(msg) => format!("{} {}", "FAIL".red(), msg),
            };
            println!("{:<20} {}", check.name, status);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_installed() {
        let installed = vec!["nomic-embed-text:latest".to_string(), "qwen2.5:7b-instruct".to_string()];
        assert!(model_installed(&installed, "nomic-embed-text"));
        assert!(model_installed(&installed, "qwen2.5:7b-instruct"));
        assert!(!model_installed(&installed, "qwen2.5:14b"));
        assert!(!model_installed(&installed, "llama3"));
    }

    #[test]
    fn test_overall_status() {
        let warn_only = vec![
            HealthCheck::new("a", HealthStatus::Pass),
            HealthCheck::new("b", HealthStatus::Warn("warning".to_string())),
        ];
        assert!(Doctor::overall_status(&warn_only));

        let failing = vec![
            HealthCheck::new("a", HealthStatus::Pass),
            HealthCheck::new("b", HealthStatus::Fail("error".to_string())),
        ];
        assert!(!Doctor::overall_status(&failing));
    }

    #[test]
    fn test_config_check_reports_invalid_config() {
        let mut config = MetaragConfig::default();
        config.retrieval.top_k = 0;
        let check = Doctor::new(config).check_config();
        assert!(matches!(check.status, HealthStatus::Fail(_)));
    }

    #[tokio::test]
    async fn test_memory_backend_is_warning() {
        let mut config = MetaragConfig::default();
        config.retrieval.backend = StoreBackend::Memory;
        let check = Doctor::new(config).check_store().await;
        assert!(matches!(check.status, HealthStatus::Warn(_)));
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Ollama and Qdrant running
    async fn test_full_diagnostics() {
        let checks = Doctor::new(MetaragConfig::default()).run_diagnostics().await;
        Doctor::display_results(&checks);
        assert!(Doctor::overall_status(&checks));
    }
}
