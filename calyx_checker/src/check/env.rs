//! Typing environments with flow-sensitive refinement.
//!
//! Environments are immutable values: every transition returns a new one.
//! A multi-flow step returns a non-empty list of environments representing
//! alternative post-states; joins are explicit and happen at merge points,
//! never by mutating shared state.

use std::collections::BTreeMap;

use crate::assembly::{Assembly, Binds};
use crate::types::ResolvedType;

/// Truth tag attached to an expression result, used to refine the
/// surrounding branch's environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTruth {
    True,
    False,
    Unknown,
}

/// Where a variable lives; selects the access opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarClass {
    Local,
    Arg,
    Captured,
}

/// Per-variable state. `flow` is always a subtype of `declared`:
/// refinement only ever shrinks.
#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
    pub declared: ResolvedType,
    pub is_const: bool,
    pub must_defined: bool,
    pub flow: ResolvedType,
}

impl VarInfo {
    pub fn new(declared: ResolvedType, is_const: bool, must_defined: bool) -> Self {
        let flow = declared.clone();
        Self {
            declared,
            is_const,
            must_defined,
            flow,
        }
    }
}

/// The current expression result riding on an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprResult {
    pub ty: ResolvedType,
    pub truth: FlowTruth,
}

/// One typing environment: template binds, variable tables (arguments,
/// captures, and a stack of local scopes - disjoint name spaces), the
/// current expression result, reachability, and the accumulated return
/// type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEnv {
    pub terms: Binds,
    args: BTreeMap<String, VarInfo>,
    captured: BTreeMap<String, VarInfo>,
    locals: Vec<BTreeMap<String, VarInfo>>,
    pub result: Option<ExprResult>,
    pub normal_flow: bool,
    pub return_result: Option<ResolvedType>,
}

impl TypeEnv {
    pub fn new(
        terms: Binds,
        args: BTreeMap<String, VarInfo>,
        captured: BTreeMap<String, VarInfo>,
    ) -> Self {
        Self {
            terms,
            args,
            captured,
            locals: vec![BTreeMap::new()],
            result: None,
            normal_flow: true,
            return_result: None,
        }
    }

    // ==================== Variables ====================

    /// Innermost-scope-first lookup across the disjoint name spaces.
    pub fn lookup_var(&self, name: &str) -> Option<(&VarInfo, VarClass)> {
        for scope in self.locals.iter().rev() {
            if let Some(info) = scope.get(name) {
                return Some((info, VarClass::Local));
            }
        }
        if let Some(info) = self.args.get(name) {
            return Some((info, VarClass::Arg));
        }
        if let Some(info) = self.captured.get(name) {
            return Some((info, VarClass::Captured));
        }
        None
    }

    /// Whether declaring `name` here would shadow anything.
    pub fn would_shadow(&self, name: &str) -> bool {
        self.lookup_var(name).is_some()
    }

    pub fn declare_local(&self, name: &str, info: VarInfo) -> Self {
        let mut next = self.clone();
        next.locals
            .last_mut()
            .expect("local scope stack is never empty")
            .insert(name.to_string(), info);
        next
    }

    fn update_var(&self, name: &str, f: impl FnOnce(&mut VarInfo)) -> Self {
        let mut next = self.clone();
        for scope in next.locals.iter_mut().rev() {
            if let Some(info) = scope.get_mut(name) {
                f(info);
                return next;
            }
        }
        if let Some(info) = next.args.get_mut(name) {
            f(info);
            return next;
        }
        if let Some(info) = next.captured.get_mut(name) {
            f(info);
        }
        next
    }

    /// Refine a variable's flow type (narrowing only; callers guarantee
    /// `flow ⊆ declared`).
    pub fn with_var_flow(&self, name: &str, flow: ResolvedType) -> Self {
        self.update_var(name, |info| info.flow = flow)
    }

    /// Record an assignment: the variable becomes defined with the given
    /// flow type.
    pub fn with_var_assigned(&self, name: &str, flow: ResolvedType) -> Self {
        self.update_var(name, |info| {
            info.flow = flow;
            info.must_defined = true;
        })
    }

    pub fn push_scope(&self) -> Self {
        let mut next = self.clone();
        next.locals.push(BTreeMap::new());
        next
    }

    /// Pop the innermost scope; returns the popped environment and the
    /// names declared in the dropped scope (sorted, for deterministic
    /// lifetime-end emission).
    pub fn pop_scope(&self) -> (Self, Vec<String>) {
        let mut next = self.clone();
        let dropped = next.locals.pop().expect("local scope stack is never empty");
        if next.locals.is_empty() {
            next.locals.push(BTreeMap::new());
        }
        (next, dropped.into_keys().collect())
    }

    /// Names declared in every open scope, innermost scope first (each
    /// scope's names sorted). Early exits emit lifetime-ends from this.
    pub fn all_scope_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        for scope in self.locals.iter().rev() {
            out.extend(scope.keys().cloned());
        }
        out
    }

    /// Names declared in the innermost scope (sorted).
    pub fn innermost_scope_vars(&self) -> Vec<String> {
        self.locals
            .last()
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ==================== Results and flow ====================

    pub fn with_result(&self, ty: ResolvedType, truth: FlowTruth) -> Self {
        let mut next = self.clone();
        next.result = Some(ExprResult { ty, truth });
        next
    }

    pub fn with_result_unknown(&self, ty: ResolvedType) -> Self {
        self.with_result(ty, FlowTruth::Unknown)
    }

    /// The current expression result type; never-typed when absent.
    pub fn result_ty(&self) -> ResolvedType {
        self.result
            .as_ref()
            .map(|r| r.ty.clone())
            .unwrap_or_else(ResolvedType::never)
    }

    pub fn result_truth(&self) -> FlowTruth {
        self.result
            .as_ref()
            .map(|r| r.truth)
            .unwrap_or(FlowTruth::Unknown)
    }

    /// Record a return: the union of return types grows, normal flow ends.
    pub fn with_return(&self, ty: ResolvedType) -> Self {
        let mut next = self.clone();
        next.return_result = Some(match &self.return_result {
            Some(existing) => ResolvedType::union_of(&[existing.clone(), ty]),
            None => ty,
        });
        next.normal_flow = false;
        next.result = None;
        next
    }

    // ==================== Joins ====================

    /// Join environments at a merge point. `terms` must agree (they are
    /// installed once per declaration); variable state is intersected over
    /// the flow-live branches; normal flow survives if any branch's does.
    pub fn join(envs: &[TypeEnv]) -> TypeEnv {
        assert!(!envs.is_empty(), "join requires at least one environment");
        for env in &envs[1..] {
            debug_assert_eq!(env.terms, envs[0].terms, "joined environments must agree on terms");
        }

        let live: Vec<&TypeEnv> = envs.iter().filter(|e| e.normal_flow).collect();
        let basis: Vec<&TypeEnv> = if live.is_empty() {
            vec![&envs[0]]
        } else {
            live
        };

        let mut joined = basis[0].clone();
        joined.args = join_tables(basis.iter().map(|e| &e.args));
        joined.captured = join_tables(basis.iter().map(|e| &e.captured));
        let depth = basis.iter().map(|e| e.locals.len()).min().unwrap_or(1);
        joined.locals = (0..depth)
            .map(|i| join_tables(basis.iter().map(move |e| &e.locals[i])))
            .collect();

        joined.normal_flow = envs.iter().any(|e| e.normal_flow);
        joined.return_result = {
            let returns: Vec<ResolvedType> = envs
                .iter()
                .filter_map(|e| e.return_result.clone())
                .collect();
            if returns.is_empty() {
                None
            } else {
                Some(ResolvedType::union_of(&returns))
            }
        };

        joined.result = if basis.iter().all(|e| e.result.is_some()) {
            let tys: Vec<ResolvedType> = basis.iter().map(|e| e.result_ty()).collect();
            let truth = join_truth(basis.iter().map(|e| e.result_truth()));
            Some(ExprResult {
                ty: ResolvedType::union_of(&tys),
                truth,
            })
        } else {
            None
        };

        joined
    }
}

fn join_truth(mut truths: impl Iterator<Item = FlowTruth>) -> FlowTruth {
    let Some(first) = truths.next() else {
        return FlowTruth::Unknown;
    };
    if truths.all(|t| t == first) {
        first
    } else {
        FlowTruth::Unknown
    }
}

fn join_tables<'a>(
    tables: impl Iterator<Item = &'a BTreeMap<String, VarInfo>> + Clone,
) -> BTreeMap<String, VarInfo> {
    let mut joined: BTreeMap<String, VarInfo> = BTreeMap::new();
    let mut first = true;
    for table in tables.clone() {
        if first {
            joined = table.clone();
            first = false;
            continue;
        }
        // Intersect the defined names.
        joined.retain(|name, _| table.contains_key(name));
        for (name, info) in joined.iter_mut() {
            let other = &table[name];
            info.flow = ResolvedType::union_of(&[info.flow.clone(), other.flow.clone()]);
            info.must_defined = info.must_defined && other.must_defined;
        }
    }
    joined
}

/// Multi-flow: alternative post-states of one step, in split order.
pub type Flows = Vec<TypeEnv>;

pub fn join_flows(flows: &[TypeEnv]) -> TypeEnv {
    TypeEnv::join(flows)
}

/// Partition flows by the boolean truth of their result. Unknown-truth
/// flows land on both sides with the truth pinned; the True side precedes
/// the False side in split order.
pub fn split_truth(flows: &[TypeEnv]) -> (Flows, Flows) {
    let mut true_flows = Vec::new();
    let mut false_flows = Vec::new();
    for env in flows {
        match env.result_truth() {
            FlowTruth::True => true_flows.push(env.clone()),
            FlowTruth::False => false_flows.push(env.clone()),
            FlowTruth::Unknown => {
                let ty = env.result_ty();
                true_flows.push(env.with_result(ty.clone(), FlowTruth::True));
                false_flows.push(env.with_result(ty, FlowTruth::False));
            }
        }
    }
    (true_flows, false_flows)
}

/// Partition flows into (Some side, None side) on the result type. When
/// the flow-carrying expression is a direct variable access, the
/// variable's flow type is refined in each side.
pub fn split_none(
    _asm: &Assembly,
    flows: &[TypeEnv],
    narrowed_var: Option<&str>,
) -> (Flows, Flows) {
    let mut some_flows = Vec::new();
    let mut none_flows = Vec::new();
    for env in flows {
        let (none_part, some_part) = env.result_ty().split_none();
        if !some_part.is_never() {
            let mut some_env = env.with_result_unknown(some_part.clone());
            if let Some(name) = narrowed_var {
                some_env = some_env.with_var_flow(name, some_part);
            }
            some_flows.push(some_env);
        }
        if !none_part.is_never() {
            let mut none_env = env.with_result(none_part.clone(), FlowTruth::False);
            if let Some(name) = narrowed_var {
                none_env = none_env.with_var_flow(name, none_part);
            }
            none_flows.push(none_env);
        }
    }
    (some_flows, none_flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;

    fn int() -> ResolvedType {
        ResolvedType::simple_entity(names::INT)
    }

    fn none() -> ResolvedType {
        ResolvedType::simple_entity(names::NONE)
    }

    fn env_with_local(name: &str, declared: ResolvedType) -> TypeEnv {
        TypeEnv::new(Binds::new(), BTreeMap::new(), BTreeMap::new())
            .declare_local(name, VarInfo::new(declared, false, true))
    }

    // ── variable tables ──────────────────────────────────────────────────

    #[test]
    fn test_inner_scope_shadows_nothing_but_lookup_finds_it() {
        let env = env_with_local("x", int()).push_scope();
        let env = env.declare_local("y", VarInfo::new(none(), false, true));
        assert!(env.lookup_var("x").is_some());
        assert!(env.lookup_var("y").is_some());
        let (env, dropped) = env.pop_scope();
        assert_eq!(dropped, vec!["y".to_string()]);
        assert!(env.lookup_var("y").is_none());
    }

    #[test]
    fn test_flow_refinement_does_not_touch_declared() {
        let declared = ResolvedType::union_of(&[int(), none()]);
        let env = env_with_local("x", declared.clone());
        let narrowed = env.with_var_flow("x", int());
        let (info, class) = narrowed.lookup_var("x").unwrap();
        assert_eq!(class, VarClass::Local);
        assert_eq!(info.flow, int());
        assert_eq!(info.declared, declared);
    }

    // ── joins ────────────────────────────────────────────────────────────

    #[test]
    fn test_join_unions_flow_types() {
        let declared = ResolvedType::union_of(&[int(), none()]);
        let base = env_with_local("x", declared.clone());
        let a = base.with_var_flow("x", int());
        let b = base.with_var_flow("x", none());
        let joined = TypeEnv::join(&[a, b]);
        assert_eq!(joined.lookup_var("x").unwrap().0.flow, declared);
    }

    #[test]
    fn test_join_ignores_dead_branches_for_vars() {
        let declared = ResolvedType::union_of(&[int(), none()]);
        let base = env_with_local("x", declared.clone());
        let live = base.with_var_flow("x", int());
        let dead = base.with_var_flow("x", none()).with_return(int());
        let joined = TypeEnv::join(&[live, dead]);
        assert!(joined.normal_flow);
        assert_eq!(joined.lookup_var("x").unwrap().0.flow, int());
        assert_eq!(joined.return_result, Some(int()));
    }

    #[test]
    fn test_join_must_defined_needs_all_branches() {
        let base = TypeEnv::new(Binds::new(), BTreeMap::new(), BTreeMap::new())
            .declare_local("x", VarInfo::new(int(), false, false));
        let a = base.with_var_assigned("x", int());
        let joined = TypeEnv::join(&[a, base.clone()]);
        assert!(!joined.lookup_var("x").unwrap().0.must_defined);
    }

    // ── splits ───────────────────────────────────────────────────────────

    #[test]
    fn test_split_truth_unknown_goes_both_ways() {
        let env = TypeEnv::new(Binds::new(), BTreeMap::new(), BTreeMap::new())
            .with_result_unknown(ResolvedType::simple_entity(names::BOOL));
        let (t, f) = split_truth(&[env]);
        assert_eq!(t.len(), 1);
        assert_eq!(f.len(), 1);
        assert_eq!(t[0].result_truth(), FlowTruth::True);
        assert_eq!(f[0].result_truth(), FlowTruth::False);
    }

    #[test]
    fn test_split_none_narrows_variable() {
        let asm = Assembly::core();
        let declared = ResolvedType::union_of(&[int(), none()]);
        let env = env_with_local("x", declared.clone()).with_result_unknown(declared);
        let (some_flows, none_flows) = split_none(&asm, &[env], Some("x"));
        assert_eq!(some_flows.len(), 1);
        assert_eq!(none_flows.len(), 1);
        assert_eq!(some_flows[0].lookup_var("x").unwrap().0.flow, int());
        assert_eq!(none_flows[0].lookup_var("x").unwrap().0.flow, none());
    }

    #[test]
    fn test_split_none_on_pure_some_has_empty_none_side() {
        let asm = Assembly::core();
        let env = env_with_local("x", int()).with_result_unknown(int());
        let (some_flows, none_flows) = split_none(&asm, &[env], Some("x"));
        assert_eq!(some_flows.len(), 1);
        assert!(none_flows.is_empty());
    }
}
