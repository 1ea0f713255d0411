//! The output assembly: everything the checker registers while lowering.
//!
//! Compiled bodies, referenced types, call targets, lambdas, and the
//! pending-processing queues for consts and globals. Keys are stable
//! strings; template binds are fingerprinted so distinct instantiations
//! get distinct keys.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::assembly::Binds;
use crate::types::ResolvedType;

use super::core::CompiledBody;

/// Fingerprint of a bind map, embedded in instantiation-sensitive keys.
pub fn binds_fingerprint(binds: &Binds) -> String {
    if binds.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    for (name, ty) in binds {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(ty.type_key().as_bytes());
        hasher.update(b";");
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

fn with_fingerprint(base: String, binds: &Binds) -> String {
    let fp = binds_fingerprint(binds);
    if fp.is_empty() {
        base
    } else {
        format!("{}#{}", base, fp)
    }
}

pub fn namespace_function_key(ns: &str, name: &str, binds: &Binds) -> String {
    with_fingerprint(format!("{}::{}", ns, name), binds)
}

pub fn static_function_key(owner_key: &str, name: &str, binds: &Binds) -> String {
    with_fingerprint(format!("{}::{}", owner_key, name), binds)
}

pub fn method_key(owner_key: &str, name: &str, binds: &Binds) -> String {
    with_fingerprint(format!("{}->{}", owner_key, name), binds)
}

pub fn virtual_method_key(root_owner: &str, name: &str, binds: &Binds) -> String {
    with_fingerprint(format!("vcall!{}->{}", root_owner, name), binds)
}

pub fn field_key(owner: &str, name: &str) -> String {
    format!("{}.{}", owner, name)
}

pub fn global_key(ns: &str, name: &str) -> String {
    format!("{}::{}", ns, name)
}

pub fn const_key(owner: &str, name: &str) -> String {
    format!("{}::{}", owner, name)
}

pub fn default_value_key(owner_key: &str, slot: &str) -> String {
    format!("{}::{}@default", owner_key, slot)
}

pub fn invariant_key(owner_key: &str, index: usize) -> String {
    format!("{}@invariant{}", owner_key, index)
}

pub fn precond_key(fkey: &str, index: usize) -> String {
    format!("{}@pre{}", fkey, index)
}

pub fn postcond_key(fkey: &str, index: usize) -> String {
    format!("{}@post{}", fkey, index)
}

/// Lambda keys are globally unique: enclosing body key, source position,
/// and the bind fingerprint of the enclosing instantiation.
pub fn lambda_key(enclosing: &str, line: usize, column: usize, binds: &Binds) -> String {
    with_fingerprint(format!("{}$lambda@{}:{}", enclosing, line, column), binds)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallKind {
    NamespaceFunction,
    StaticFunction,
    Method,
    VirtualMethod,
}

/// A registered call target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRegistration {
    pub kind: CallKind,
    pub owner: Option<String>,
    pub name: String,
    pub binds: Binds,
}

/// A registered lambda: capture names with their flow types at the
/// construction site, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LambdaRegistration {
    pub captures: Vec<(String, ResolvedType)>,
}

/// Pending compilation work discovered while checking bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PendingConst {
    Namespace { ns: String, name: String },
    Member { owner: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingGlobal {
    pub ns: String,
    pub name: String,
}

/// The output of a checker run.
#[derive(Debug, Default, Serialize)]
pub struct IrAssembly {
    pub type_instantiations: IndexMap<String, ResolvedType>,
    pub resolved_type_refs: IndexMap<String, ResolvedType>,
    pub calls: IndexMap<String, CallRegistration>,
    pub lambdas: IndexMap<String, LambdaRegistration>,
    pub bodies: IndexMap<String, CompiledBody>,
    #[serde(skip)]
    pending_consts: Vec<(String, PendingConst)>,
    #[serde(skip)]
    pending_globals: Vec<(String, PendingGlobal)>,
    #[serde(skip)]
    pending_seen: HashSet<String>,
}

impl IrAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity instantiation reached by construction or call.
    pub fn register_type_instantiation(&mut self, ty: &ResolvedType) -> String {
        let key = ty.type_key();
        self.type_instantiations
            .entry(key.clone())
            .or_insert_with(|| ty.clone());
        key
    }

    /// Register any type the emitted IR references.
    pub fn register_resolved_type_reference(&mut self, ty: &ResolvedType) -> String {
        let key = ty.type_key();
        self.resolved_type_refs
            .entry(key.clone())
            .or_insert_with(|| ty.clone());
        key
    }

    pub fn register_call(&mut self, key: String, registration: CallRegistration) {
        self.calls.entry(key).or_insert(registration);
    }

    pub fn register_lambda(&mut self, key: String, registration: LambdaRegistration) {
        self.lambdas.entry(key).or_insert(registration);
    }

    pub fn register_body(&mut self, body: CompiledBody) {
        self.bodies.insert(body.bkey.clone(), body);
    }

    pub fn has_body(&self, bkey: &str) -> bool {
        self.bodies.contains_key(bkey)
    }

    /// Queue a constant initializer for compilation. Idempotent per key.
    pub fn register_pending_const_processing(&mut self, key: String, pending: PendingConst) {
        if self.pending_seen.insert(key.clone()) {
            self.pending_consts.push((key, pending));
        }
    }

    /// Queue a global initializer for compilation. Idempotent per key.
    pub fn register_pending_global_processing(&mut self, key: String, pending: PendingGlobal) {
        if self.pending_seen.insert(key.clone()) {
            self.pending_globals.push((key, pending));
        }
    }

    pub fn take_pending_consts(&mut self) -> Vec<(String, PendingConst)> {
        std::mem::take(&mut self.pending_consts)
    }

    pub fn take_pending_globals(&mut self) -> Vec<(String, PendingGlobal)> {
        std::mem::take(&mut self.pending_globals)
    }

    /// JSON export for downstream passes and golden tests.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;

    #[test]
    fn test_binds_fingerprint_is_stable_and_distinct() {
        let mut a = Binds::new();
        a.insert("T".to_string(), ResolvedType::simple_entity(names::INT));
        let mut b = Binds::new();
        b.insert("T".to_string(), ResolvedType::simple_entity(names::BOOL));
        assert_eq!(binds_fingerprint(&a), binds_fingerprint(&a));
        assert_ne!(binds_fingerprint(&a), binds_fingerprint(&b));
        assert_eq!(binds_fingerprint(&Binds::new()), "");
    }

    #[test]
    fn test_lambda_key_includes_position() {
        let binds = Binds::new();
        let a = lambda_key("App::main", 4, 9, &binds);
        let b = lambda_key("App::main", 4, 12, &binds);
        assert_ne!(a, b);
        assert!(a.starts_with("App::main$lambda@4:9"));
    }

    #[test]
    fn test_pending_registration_is_idempotent() {
        let mut ir = IrAssembly::new();
        let pending = PendingConst::Namespace {
            ns: "App".to_string(),
            name: "limit".to_string(),
        };
        ir.register_pending_const_processing("App::limit".to_string(), pending.clone());
        ir.register_pending_const_processing("App::limit".to_string(), pending);
        assert_eq!(ir.take_pending_consts().len(), 1);
    }
}
