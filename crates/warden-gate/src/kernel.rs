//! Explicit wiring of the interception pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use warden_storage::{EntityStore, GovernanceCatalog, WardenStorage};
use warden_types::{CallerIdentity, WorkflowDefinition};
use warden_workflow::StateMachine;

use crate::bridge::AsyncBridge;
use crate::config::GateConfig;
use crate::context::{ConfigProvider, ContextField, ContextProvider, ContextRegistry, SystemProvider};
use crate::error::GateError;
use crate::governance::GovernanceEvaluator;
use crate::identity::current_identity;
use crate::interceptor::MutationInterceptor;
use crate::outbox::OutboxWriter;
use crate::unit_of_work::{FlushHook, UnitOfWork};

/// Assembles a [`WardenKernel`].
pub struct WardenKernelBuilder<S> {
    storage: Arc<S>,
    config: GateConfig,
    sidecar: Option<Arc<dyn GovernanceCatalog>>,
    providers: Vec<Arc<dyn ContextProvider>>,
    hooks: Vec<Arc<dyn FlushHook>>,
}

impl<S: WardenStorage + 'static> WardenKernelBuilder<S> {
    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Read governance data through a separate catalog handle (for example
    /// a second connection pool) instead of the primary storage.
    pub fn with_sidecar_catalog(mut self, catalog: Arc<dyn GovernanceCatalog>) -> Self {
        self.sidecar = Some(catalog);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Extra flush hook, run after the interceptor.
    pub fn with_hook(mut self, hook: Arc<dyn FlushHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<WardenKernel<S>, GateError> {
        let Self {
            storage,
            config,
            sidecar,
            providers,
            hooks: extra_hooks,
        } = self;

        let catalog: Arc<dyn GovernanceCatalog> = match sidecar {
            Some(catalog) => catalog,
            None => storage.clone(),
        };

        let system = SystemProvider::new(config.environment.clone(), config.system_version.clone())
            .with_maintenance(config.maintenance_mode);
        let mut registry = ContextRegistry::with_defaults(system);
        let config_provider = Arc::new(ConfigProvider::new(config.config_cache_ttl()));
        registry.register(config_provider.clone())?;
        for provider in providers {
            registry.register(provider)?;
        }

        let writer = OutboxWriter::new(config.event_source.clone());
        let evaluator = Arc::new(GovernanceEvaluator::new(catalog.clone(), registry));
        let interceptor = MutationInterceptor::new(
            AsyncBridge::new(config.bridge_timeout()),
            evaluator.clone(),
            catalog,
            writer.clone(),
            config.failure_policies.clone(),
        );

        let mut hooks: Vec<Arc<dyn FlushHook>> = vec![Arc::new(interceptor)];
        hooks.extend(extra_hooks);

        info!(
            environment = %config.environment,
            namespaces = ?evaluator.registry().namespaces(),
            hooks = hooks.len(),
            "Warden kernel assembled"
        );

        Ok(WardenKernel {
            storage,
            config,
            writer,
            hooks,
            evaluator,
            config_provider,
        })
    }
}

/// Entry point for governed writes.
pub struct WardenKernel<S> {
    storage: Arc<S>,
    config: GateConfig,
    writer: OutboxWriter,
    hooks: Vec<Arc<dyn FlushHook>>,
    evaluator: Arc<GovernanceEvaluator>,
    config_provider: Arc<ConfigProvider>,
}

impl<S: WardenStorage + 'static> WardenKernel<S> {
    pub fn builder(storage: Arc<S>) -> WardenKernelBuilder<S> {
        WardenKernelBuilder {
            storage,
            config: GateConfig::default(),
            sidecar: None,
            providers: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn new(storage: Arc<S>, config: GateConfig) -> Result<Self, GateError> {
        Self::builder(storage).with_config(config).build()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Start a unit of work as the current task's caller.
    pub fn begin(&self) -> UnitOfWork {
        self.begin_as(current_identity())
    }

    pub fn begin_as(&self, identity: CallerIdentity) -> UnitOfWork {
        let store: Arc<dyn EntityStore> = self.storage.clone();
        UnitOfWork::new(store, self.hooks.clone(), self.writer.clone(), identity)
    }

    /// Field documentation for every context namespace.
    pub fn context_schema(&self) -> BTreeMap<String, Vec<ContextField>> {
        self.evaluator.registry().schema()
    }

    /// Store a config value and drop the cached copy.
    pub async fn set_config_value(&self, key: &str, value: Value) -> Result<(), GateError> {
        self.storage.set_config_value(key, value).await?;
        self.config_provider.invalidate();
        Ok(())
    }

    pub fn invalidate_config(&self) {
        self.config_provider.invalidate();
    }

    /// Validate and store a new workflow version.
    pub async fn register_workflow(
        &self,
        workflow: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, GateError> {
        StateMachine::validated(&workflow)?;
        let stored = self.storage.register_workflow(workflow).await?;
        info!(
            workflow = %stored.name,
            domain = %stored.domain,
            scope = %stored.scope,
            version = stored.version,
            "Workflow registered"
        );
        Ok(stored)
    }
}
