//! Typed declaration of the agent stack.
//!
//! The declaration is pure data: a network with public subnets only, a
//! container cluster, a task definition for the agent container, and a
//! load-balanced service with an HTTP health check. Building it has no side
//! effects and deploys nothing; every required input arrives through a
//! [`StackConfig`] validated at construction.

use serde::{Deserialize, Serialize};

use crate::contract::ValidationError;

pub const DEFAULT_AGENT_BUILD_CONTEXT: &str = "cdk/agent";
pub const AGENT_CONTAINER_PORT: u16 = 8080;
pub const HEALTH_CHECK_PATH: &str = "/api/health";
pub const AGENT_TOKEN_ENV_VAR: &str = "PREFECT__CLOUD__AGENT__AUTH_TOKEN";
pub const RUNNER_TOKEN_SECRET_FIELD: &str = "RUNNER_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    identifier: String,
    runner_token_secret_arn: String,
    agent_build_context: String,
}

impl StackConfig {
    pub fn new(
        identifier: impl Into<String>,
        runner_token_secret_arn: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let identifier = identifier.into().trim().to_string();
        if identifier.is_empty() {
            return Err(ValidationError::new("stack identifier cannot be empty"));
        }
        if !identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::new(format!(
                "stack identifier '{identifier}' may only contain lowercase letters, digits and '-'"
            )));
        }

        let runner_token_secret_arn = runner_token_secret_arn.into().trim().to_string();
        if runner_token_secret_arn.is_empty() {
            return Err(ValidationError::new(
                "runner token secret ARN cannot be empty",
            ));
        }
        let mut arn_parts = runner_token_secret_arn.split(':');
        if arn_parts.next() != Some("arn") || arn_parts.nth(1) != Some("secretsmanager") {
            return Err(ValidationError::new(format!(
                "'{runner_token_secret_arn}' is not a secretsmanager ARN"
            )));
        }

        Ok(Self {
            identifier,
            runner_token_secret_arn,
            agent_build_context: DEFAULT_AGENT_BUILD_CONTEXT.to_string(),
        })
    }

    pub fn with_agent_build_context(
        mut self,
        directory: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let directory = directory.into().trim().to_string();
        if directory.is_empty() {
            return Err(ValidationError::new(
                "agent build context cannot be empty",
            ));
        }
        self.agent_build_context = directory;
        Ok(self)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn runner_token_secret_arn(&self) -> &str {
        &self.runner_token_secret_arn
    }

    pub fn agent_build_context(&self) -> &str {
        &self.agent_build_context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackDeclaration {
    pub network: NetworkDeclaration,
    pub cluster: ClusterDeclaration,
    pub task_definition: TaskDefinitionDeclaration,
    pub service: ServiceDeclaration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkDeclaration {
    pub id: String,
    pub cidr: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub nat_gateways: u32,
    pub max_availability_zones: u32,
    pub subnets: Vec<SubnetDeclaration>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetDeclaration {
    pub name: String,
    pub kind: SubnetKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterDeclaration {
    pub id: String,
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDefinitionDeclaration {
    pub id: String,
    pub cpu_units: u32,
    pub memory_limit_mib: u32,
    pub container: ContainerDeclaration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerDeclaration {
    pub id: String,
    pub image_build_context: String,
    pub port_mappings: Vec<PortMapping>,
    pub log_stream_prefix: String,
    pub secrets: Vec<SecretInjection>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// A secret field injected into the container environment by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretInjection {
    pub env_var: String,
    pub secret_id: String,
    pub secret_arn: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDeclaration {
    pub id: String,
    pub cluster_id: String,
    pub task_definition_id: String,
    pub assign_public_ip: bool,
    pub platform_version: String,
    pub desired_count: u32,
    pub propagate_tags_from: String,
    pub health_check: HealthCheckDeclaration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckDeclaration {
    pub path: String,
    pub port: u16,
}

pub fn declare_stack(config: &StackConfig) -> StackDeclaration {
    let identifier = config.identifier();
    let network_id = format!("bakery-vpc-{identifier}");
    let cluster_id = format!("bakery-cluster-{identifier}");
    let task_definition_id = format!("prefect-ecs-agent-task-definition-{identifier}");

    StackDeclaration {
        network: NetworkDeclaration {
            id: network_id.clone(),
            cidr: "10.0.0.0/16".to_string(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
            nat_gateways: 0,
            max_availability_zones: 3,
            subnets: vec![SubnetDeclaration {
                name: "PublicSubnet1".to_string(),
                kind: SubnetKind::Public,
            }],
        },
        cluster: ClusterDeclaration {
            id: cluster_id.clone(),
            network_id,
        },
        task_definition: TaskDefinitionDeclaration {
            id: task_definition_id.clone(),
            cpu_units: 512,
            memory_limit_mib: 2048,
            container: ContainerDeclaration {
                id: format!("prefect-ecs-agent-task-container-{identifier}"),
                image_build_context: config.agent_build_context().to_string(),
                port_mappings: vec![PortMapping {
                    container_port: AGENT_CONTAINER_PORT,
                    host_port: AGENT_CONTAINER_PORT,
                }],
                log_stream_prefix: "ecs-agent".to_string(),
                secrets: vec![SecretInjection {
                    env_var: AGENT_TOKEN_ENV_VAR.to_string(),
                    secret_id: format!("prefect-cloud-runner-token-{identifier}"),
                    secret_arn: config.runner_token_secret_arn().to_string(),
                    field: RUNNER_TOKEN_SECRET_FIELD.to_string(),
                }],
            },
        },
        service: ServiceDeclaration {
            id: format!("prefect-ecs-agent-service-{identifier}"),
            cluster_id,
            task_definition_id,
            assign_public_ip: true,
            platform_version: "LATEST".to_string(),
            desired_count: 1,
            propagate_tags_from: "SERVICE".to_string(),
            health_check: HealthCheckDeclaration {
                path: HEALTH_CHECK_PATH.to_string(),
                port: AGENT_CONTAINER_PORT,
            },
        },
    }
}

pub fn render_stack_json(declaration: &StackDeclaration) -> Result<String, ValidationError> {
    serde_json::to_string_pretty(declaration)
        .map_err(|error| ValidationError::new(format!("failed to render stack: {error}")))
}
