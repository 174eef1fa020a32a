// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow and activity registration table
//!
//! Functions are registered with their concrete argument and result types and
//! stored behind a fixed JSON-payload signature. The table is filled before the
//! engine starts and is read-only afterwards.

use crate::activity::ActivityContext;
use crate::context::RunContext;
use crate::error::{ActivityError, RunError};
use replay_core::{payload, SLEEP_ACTIVITY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type WorkflowFn =
    Arc<dyn Fn(&mut RunContext, Value) -> Result<Value, RunError> + Send + Sync>;

pub(crate) type ActivityFn<B> = Arc<
    dyn Fn(ActivityContext, Arc<B>, Value) -> BoxFuture<'static, Result<Value, ActivityError>>
        + Send
        + Sync,
>;

/// Errors that can occur while registering functions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} `{name}` already registered in namespace `{namespace}`")]
    Duplicate {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("activity name `{0}` is reserved")]
    Reserved(String),
}

type Name = (String, String);

/// Workflows and activities by `(namespace, name)`; `B` is the backend bundle
/// handed to every activity
pub struct Registry<B> {
    workflows: HashMap<Name, WorkflowFn>,
    activities: HashMap<Name, ActivityFn<B>>,
}

impl<B> Default for Registry<B> {
    fn default() -> Self {
        Self {
            workflows: HashMap::new(),
            activities: HashMap::new(),
        }
    }
}

impl<B: Send + Sync + 'static> Registry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow body
    pub fn register_workflow<A, R, F>(
        &mut self,
        namespace: &str,
        name: &str,
        workflow: F,
    ) -> Result<(), RegistryError>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&mut RunContext, A) -> Result<R, RunError> + Send + Sync + 'static,
    {
        let key = (namespace.to_string(), name.to_string());
        if self.workflows.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                kind: "workflow",
                namespace: key.0,
                name: key.1,
            });
        }

        let erased: WorkflowFn = Arc::new(move |ctx: &mut RunContext, args: Value| {
            let args: A = payload::decode(args)?;
            let output = workflow(ctx, args)?;
            Ok(payload::encode(&output)?)
        });
        self.workflows.insert(key, erased);
        Ok(())
    }

    /// Register an async activity function
    pub fn register_activity<A, R, F, Fut>(
        &mut self,
        namespace: &str,
        name: &str,
        activity: F,
    ) -> Result<(), RegistryError>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(ActivityContext, Arc<B>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActivityError>> + Send + 'static,
    {
        if name == SLEEP_ACTIVITY {
            return Err(RegistryError::Reserved(name.to_string()));
        }
        let key = (namespace.to_string(), name.to_string());
        if self.activities.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                kind: "activity",
                namespace: key.0,
                name: key.1,
            });
        }

        let erased: ActivityFn<B> = Arc::new(
            move |ctx: ActivityContext,
                  backends: Arc<B>,
                  args: Value|
                  -> BoxFuture<'static, Result<Value, ActivityError>> {
                let args: A = match payload::decode(args) {
                    Ok(args) => args,
                    Err(e) => return Box::pin(async move { Err(e.into()) }),
                };
                let fut = activity(ctx, backends, args);
                Box::pin(async move {
                    let output = fut.await?;
                    Ok(payload::encode(&output)?)
                })
            },
        );
        self.activities.insert(key, erased);
        Ok(())
    }

    pub(crate) fn workflow(&self, namespace: &str, name: &str) -> Option<&WorkflowFn> {
        self.workflows
            .get(&(namespace.to_string(), name.to_string()))
    }

    pub(crate) fn activity(&self, namespace: &str, name: &str) -> Option<&ActivityFn<B>> {
        self.activities
            .get(&(namespace.to_string(), name.to_string()))
    }

    pub fn has_workflow(&self, namespace: &str, name: &str) -> bool {
        self.workflow(namespace, name).is_some()
    }

    pub fn has_activity(&self, namespace: &str, name: &str) -> bool {
        self.activity(namespace, name).is_some()
    }

    /// Namespaces with at least one registered workflow
    pub fn workflow_namespaces(&self) -> BTreeSet<String> {
        self.workflows.keys().map(|(ns, _)| ns.clone()).collect()
    }

    /// Namespaces with at least one registered activity
    pub fn activity_namespaces(&self) -> BTreeSet<String> {
        self.activities.keys().map(|(ns, _)| ns.clone()).collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
