//! Builds a session from a TOML model description.
//!
//! ```toml
//! [[source]]
//! kind = "database"
//! name = "sales"
//!
//!   [[source.children]]
//!   kind = "table"
//!   name = "orders"
//!
//!     [[source.children.children]]
//!     kind = "column"
//!     name = "id"
//!
//! [[target]]
//! kind = "table"
//! name = "fact_orders"
//!
//!   [[target.children]]
//!   kind = "column"
//!   name = "order_id"
//!   lineage = "sales/orders/id"
//!   properties = { type = "integer", nullable = false }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::arena::{NodeId, NodeKind, PropertyValue, SchemaArena};
use crate::errors::{AppError, AppResult, SchemaError};
use crate::events::MutationOutcome;
use crate::session::SchemaSession;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<RawValue> for PropertyValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Bool(b) => PropertyValue::Bool(b),
            RawValue::Int(i) => PropertyValue::Int(i),
            RawValue::Text(s) => PropertyValue::Text(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDescription {
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, RawValue>,
    /// Path of the source column below the source root, columns only
    pub lineage: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDescription {
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_target_name")]
    pub target_name: String,
    #[serde(default)]
    pub source: Vec<NodeDescription>,
    #[serde(default)]
    pub target: Vec<NodeDescription>,
}

fn default_source_name() -> String {
    "source".to_string()
}

fn default_target_name() -> String {
    "target".to_string()
}

pub struct SessionBuilder {
    origin: PathBuf,
    pending_lineage: Vec<(NodeId, String)>,
}

impl SessionBuilder {
    /// Reads and builds a model description file.
    #[instrument(level = "debug")]
    pub fn from_path(path: &Path) -> AppResult<SchemaSession> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("read {}", path.display()), e))?;
        Self::from_str_at(&content, path)
    }

    /// Builds a description given as TOML text; `origin` is used in errors.
    pub fn from_str_at(content: &str, origin: &Path) -> AppResult<SchemaSession> {
        let description: ModelDescription =
            toml::from_str(content).map_err(|e| AppError::InvalidModel {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut builder = Self {
            origin: origin.to_path_buf(),
            pending_lineage: Vec::new(),
        };
        builder.build(&description)
    }

    #[instrument(level = "debug", skip(self, description))]
    pub fn build(&mut self, description: &ModelDescription) -> AppResult<SchemaSession> {
        let mut session =
            SchemaSession::new(&description.source_name, &description.target_name);
        let (source_root, target_root) = (session.source_root(), session.target_root());
        let model = session.model_mut();

        for node in &description.source {
            self.add_subtree(model, source_root, node)?;
        }
        for node in &description.target {
            self.add_subtree(model, target_root, node)?;
        }

        for (column, path) in std::mem::take(&mut self.pending_lineage) {
            let source = model
                .find_path(source_root, &path)
                .map_err(|e| self.invalid(format!("lineage '{}': {}", path, e)))?;
            let outcome = model.set_lineage(column, Some(source))?;
            self.expect_applied(outcome)?;
        }
        debug!("built model with {} node(s)", model.len());
        Ok(session)
    }

    fn add_subtree(
        &mut self,
        model: &mut SchemaArena,
        parent: NodeId,
        description: &NodeDescription,
    ) -> AppResult<()> {
        let node = model.create_node(description.kind, &description.name);
        for (key, value) in &description.properties {
            let outcome = model.set_property(node, key, value.clone().into())?;
            self.expect_applied(outcome)?;
        }
        if let Some(path) = &description.lineage {
            if description.kind != NodeKind::Column {
                return Err(SchemaError::NotAColumn(node).into());
            }
            self.pending_lineage.push((node, path.clone()));
        }

        let index = model.children(parent)?.len();
        let outcome = model.insert_children(parent, index, &[node])?;
        self.expect_applied(outcome)?;

        for child in &description.children {
            self.add_subtree(model, node, child)?;
        }
        Ok(())
    }

    fn expect_applied(&self, outcome: MutationOutcome) -> AppResult<()> {
        match outcome {
            MutationOutcome::Applied => Ok(()),
            MutationOutcome::Vetoed(veto) => {
                Err(self.invalid(format!("vetoed while loading: {}", veto)))
            }
        }
    }

    fn invalid(&self, reason: String) -> AppError {
        AppError::InvalidModel {
            path: self.origin.clone(),
            reason,
        }
    }
}
