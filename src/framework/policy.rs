//! Policy chains.
//!
//! A policy is a guard run at a fixed point of an operation's lifecycle. Each
//! operation type keeps one ordered list per [`PolicyChain`]; the first
//! policy returning an error aborts the lifecycle step.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::error::OpError;
use super::operation::{Op, Operation};

/// The lifecycle points policies can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolicyChain {
    /// During construction, after params are stored.
    OnInit,
    /// Model ops only: before params are written to the model.
    BeforeAttrAssign,
    #[default]
    BeforePerform,
    AfterPerform,
    BeforeNestedModelOps,
    /// Model ops only: before the model graph is validated.
    BeforeModelValidation,
    BeforeModelSave,
}

impl PolicyChain {
    pub const ALL: [PolicyChain; 7] = [
        Self::OnInit,
        Self::BeforeAttrAssign,
        Self::BeforePerform,
        Self::AfterPerform,
        Self::BeforeNestedModelOps,
        Self::BeforeModelValidation,
        Self::BeforeModelSave,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::OnInit => "on_init",
            Self::BeforeAttrAssign => "before_attr_assign",
            Self::BeforePerform => "before_perform",
            Self::AfterPerform => "after_perform",
            Self::BeforeNestedModelOps => "before_nested_model_ops",
            Self::BeforeModelValidation => "before_model_validation",
            Self::BeforeModelSave => "before_model_save",
        }
    }

    /// Chains that only make sense for operations assigning model attributes.
    pub fn requires_attribute_assignment(self) -> bool {
        matches!(self, Self::BeforeAttrAssign)
    }

    /// Chains that only make sense for operations building a model.
    pub fn requires_model(self) -> bool {
        matches!(self, Self::BeforeModelValidation)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyChain {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|chain| chain.name() == s)
            .ok_or_else(|| {
                let available: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
                OpError::definition(format!(
                    "Unknown policy chain {s:?}, available are {}.",
                    available.join(", ")
                ))
            })
    }
}

pub type Policy<K> = Arc<dyn Fn(&mut Op<K>) -> Result<(), OpError> + Send + Sync>;

/// The per-operation-type policy lists, one per chain.
pub struct PolicyChains<K: Operation> {
    chains: [Vec<Policy<K>>; 7],
}

impl<K: Operation> PolicyChains<K> {
    pub(crate) fn push(&mut self, chain: PolicyChain, policy: Policy<K>, prepend: bool) {
        let list = &mut self.chains[chain.index()];
        if prepend {
            list.insert(0, policy);
        } else {
            list.push(policy);
        }
    }

    pub fn get(&self, chain: PolicyChain) -> &[Policy<K>] {
        &self.chains[chain.index()]
    }

    pub fn len(&self, chain: PolicyChain) -> usize {
        self.get(chain).len()
    }
}

impl<K: Operation> Default for PolicyChains<K> {
    fn default() -> Self {
        Self {
            chains: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl<K: Operation> fmt::Debug for PolicyChains<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for chain in PolicyChain::ALL {
            map.entry(&chain.name(), &self.len(chain));
        }
        map.finish()
    }
}
