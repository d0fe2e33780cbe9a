//! The plan builder: a symbolic call graph under construction.

use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::stable_graph::NodeIndex;

use crate::builtins;
use crate::call_site::CallSite;
use crate::errors::PlanError;
use crate::func::SymFn;
use crate::graph::{EdgeKind, Node, NodeData, NodeKind, PlanGraph};
use crate::value::Value;

static NEXT_LINEAGE: AtomicU64 = AtomicU64::new(1);

/// A symbolic argument: a plan node, a plain value, or a container shape
/// whose children may themselves contain nodes.
///
/// [`Plan::gather`] walks this tree; containers with no symbolic children
/// collapse to a single literal, while containers holding nodes become
/// reconstructor calls that rebuild the same container shape at run time.
#[derive(Debug, Clone)]
pub enum Sym {
    Node(Node),
    Value(Value),
    List(Vec<Sym>),
    Tuple(Vec<Sym>),
    Set(Vec<Sym>),
    Map(Vec<(Sym, Sym)>),
}

impl From<Node> for Sym {
    fn from(node: Node) -> Self {
        Sym::Node(node)
    }
}

impl From<Value> for Sym {
    fn from(value: Value) -> Self {
        Sym::Value(value)
    }
}

macro_rules! sym_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Sym {
            fn from(value: $ty) -> Self {
                Sym::Value(Value::from(value))
            }
        })*
    };
}

sym_from_value!((), bool, i32, i64, f64, &str, String, std::path::PathBuf);

/// Positional and keyword arguments for [`Plan::call`].
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub(crate) positional: Vec<Sym>,
    pub(crate) keyword: Vec<(String, Sym)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Sym>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Sym>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        CallArgs::new()
    }
}

impl<const N: usize> From<[Sym; N]> for CallArgs {
    fn from(positional: [Sym; N]) -> Self {
        CallArgs {
            positional: positional.into(),
            keyword: Vec::new(),
        }
    }
}

impl From<Vec<Sym>> for CallArgs {
    fn from(positional: Vec<Sym>) -> Self {
        CallArgs {
            positional,
            keyword: Vec::new(),
        }
    }
}

enum Gathered {
    Node(Node),
    Value(Value),
}

enum ContainerShape {
    List,
    Tuple,
    Set,
    Map,
}

/// A symbolic call graph.
///
/// Plans are built incrementally on the caller's thread; once handed to
/// `run` or `render` they are treated as read-only.
#[derive(Debug)]
pub struct Plan {
    pub(crate) graph: PlanGraph,
    pub(crate) lineage: u64,
    scope: Vec<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            graph: PlanGraph::default(),
            lineage: NEXT_LINEAGE.fetch_add(1, Ordering::Relaxed),
            scope: Vec::new(),
        }
    }

    /// Add a literal value to this plan.
    #[track_caller]
    pub fn lit(&mut self, value: impl Into<Value>) -> Node {
        self.lit_at(CallSite::capture(), value.into())
    }

    /// Add a function call to this plan.
    ///
    /// Arguments bind eagerly against the callable's signature; non-node
    /// arguments are converted via [`Plan::gather`].
    #[track_caller]
    pub fn call(&mut self, func: &SymFn, args: impl Into<CallArgs>) -> Result<Node, PlanError> {
        let site = CallSite::capture();
        let args = args.into();
        let keyword_names: Vec<&str> = args.keyword.iter().map(|(name, _)| name.as_str()).collect();
        func.signature()
            .bind(args.positional.len(), &keyword_names)
            .map_err(|source| PlanError::SignatureMismatch {
                fn_name: func.name().to_string(),
                source,
            })?;
        for sym in args
            .positional
            .iter()
            .chain(args.keyword.iter().map(|(_, sym)| sym))
        {
            self.check_sym(sym)?;
        }

        let positional: Vec<Node> = args
            .positional
            .into_iter()
            .map(|sym| self.gather_at(site, sym))
            .collect();
        let keyword: Vec<(String, Node)> = args
            .keyword
            .into_iter()
            .map(|(name, sym)| {
                let node = self.gather_at(site, sym);
                (name, node)
            })
            .collect();
        Ok(self.call_with_args(site, func, positional, keyword))
    }

    /// Gather a structured value that may contain nodes into a single node
    /// representing the whole structure.
    ///
    /// Cyclic structures cannot be expressed by [`Sym`], so the documented
    /// unbounded-recursion failure mode of structural gathering cannot occur
    /// here; deep trees still recurse per level.
    #[track_caller]
    pub fn gather(&mut self, value: impl Into<Sym>) -> Node {
        self.gather_at(CallSite::capture(), value.into())
    }

    /// Add a dependency: `source` must run before `target`.
    #[track_caller]
    pub fn add_dependency(&mut self, source: Node, target: Node) -> Result<(), PlanError> {
        for node in [source, target] {
            self.check_node(node)?;
        }
        self.graph.add_edge(source.index, target.index, EdgeKind::Dependency);
        Ok(())
    }

    /// Unpack a symbolic iterable of known length into one node per element.
    #[track_caller]
    pub fn unpack(&mut self, iterable: impl Into<Sym>, length: usize) -> Vec<Node> {
        let site = CallSite::capture();
        let gathered = self.gather_at(site, iterable.into());
        let unpack_fn = builtins::unpack();
        let length_node = self.lit_at(site, Value::Int(length as i64));
        let tuple = self.call_with_args(site, &unpack_fn, vec![gathered, length_node], Vec::new());
        let item_fn = builtins::get_item();
        (0..length)
            .map(|index| {
                let index_node = self.lit_at(site, Value::Int(index as i64));
                self.call_with_args(site, &item_fn, vec![tuple, index_node], Vec::new())
            })
            .collect()
    }

    /// Run `f` with the given tags appended to the current scope.
    ///
    /// The scope is restored when `f` returns, on every exit path.
    pub fn scope<R, I>(&mut self, tags: I, f: impl FnOnce(&mut Plan) -> R) -> R
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let depth = self.scope.len();
        self.scope.extend(tags.into_iter().map(Into::into));
        let result = f(self);
        self.scope.truncate(depth);
        result
    }

    pub fn contains(&self, node: Node) -> bool {
        node.lineage == self.lineage && self.graph.contains_node(node.index)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn check_sym(&self, sym: &Sym) -> Result<(), PlanError> {
        match sym {
            Sym::Node(node) => self.check_node(*node),
            Sym::Value(_) => Ok(()),
            Sym::List(children) | Sym::Tuple(children) | Sym::Set(children) => {
                children.iter().try_for_each(|child| self.check_sym(child))
            }
            Sym::Map(pairs) => pairs.iter().try_for_each(|(key, value)| {
                self.check_sym(key)?;
                self.check_sym(value)
            }),
        }
    }

    pub(crate) fn check_node(&self, node: Node) -> Result<(), PlanError> {
        if node.lineage != self.lineage {
            return Err(PlanError::ForeignPlan);
        }
        if !self.graph.contains_node(node.index) {
            return Err(PlanError::UnknownNode);
        }
        Ok(())
    }

    pub(crate) fn lit_at(&mut self, site: CallSite, value: Value) -> Node {
        let index = self.graph.add_node(NodeData {
            kind: NodeKind::Literal(value),
            scope: self.scope.clone(),
            implicit_scope: Vec::new(),
            call_site: site,
        });
        self.node(index)
    }

    /// Add a call node with pre-gathered arguments. Binding has already been
    /// validated (or is a variadic builtin).
    pub(crate) fn call_with_args(
        &mut self,
        site: CallSite,
        func: &SymFn,
        positional: Vec<Node>,
        keyword: Vec<(String, Node)>,
    ) -> Node {
        let index = self.graph.add_node(NodeData {
            kind: NodeKind::Call(func.clone()),
            scope: self.scope.clone(),
            implicit_scope: vec![func.name().to_string()],
            call_site: site,
        });
        for (position, argument) in positional.into_iter().enumerate() {
            self.graph
                .add_edge(argument.index, index, EdgeKind::Positional { index: position });
        }
        for (position, (name, argument)) in keyword.into_iter().enumerate() {
            self.graph.add_edge(
                argument.index,
                index,
                EdgeKind::Keyword {
                    name,
                    index: position,
                },
            );
        }
        self.node(index)
    }

    pub(crate) fn node(&self, index: NodeIndex) -> Node {
        Node {
            lineage: self.lineage,
            index,
        }
    }

    pub(crate) fn gather_at(&mut self, site: CallSite, sym: Sym) -> Node {
        match self.collapse(site, sym) {
            Gathered::Node(node) => node,
            Gathered::Value(value) => self.lit_at(site, value),
        }
    }

    fn collapse(&mut self, site: CallSite, sym: Sym) -> Gathered {
        match sym {
            Sym::Node(node) => Gathered::Node(node),
            Sym::Value(value) => Gathered::Value(value),
            Sym::List(children) => self.collapse_container(site, children, ContainerShape::List),
            Sym::Tuple(children) => self.collapse_container(site, children, ContainerShape::Tuple),
            Sym::Set(children) => self.collapse_container(site, children, ContainerShape::Set),
            Sym::Map(pairs) => {
                let children = pairs
                    .into_iter()
                    .map(|(key, value)| Sym::Tuple(vec![key, value]))
                    .collect();
                self.collapse_container(site, children, ContainerShape::Map)
            }
        }
    }

    fn collapse_container(
        &mut self,
        site: CallSite,
        children: Vec<Sym>,
        shape: ContainerShape,
    ) -> Gathered {
        let collapsed: Vec<Gathered> = children
            .into_iter()
            .map(|child| self.collapse(site, child))
            .collect();
        if collapsed.iter().any(|child| matches!(child, Gathered::Node(_))) {
            let func = match shape {
                ContainerShape::List => builtins::gather_list(),
                ContainerShape::Tuple => builtins::gather_tuple(),
                ContainerShape::Set => builtins::gather_set(),
                ContainerShape::Map => builtins::gather_map(),
            };
            let arguments: Vec<Node> = collapsed
                .into_iter()
                .map(|child| match child {
                    Gathered::Node(node) => node,
                    Gathered::Value(value) => self.lit_at(site, value),
                })
                .collect();
            return Gathered::Node(self.call_with_args(site, &func, arguments, Vec::new()));
        }

        let values = collapsed.into_iter().map(|child| match child {
            Gathered::Node(_) => unreachable!("container has no symbolic children"),
            Gathered::Value(value) => value,
        });
        Gathered::Value(match shape {
            ContainerShape::List => Value::List(values.collect()),
            ContainerShape::Tuple => Value::Tuple(values.collect()),
            ContainerShape::Set => Value::Set(values.collect()),
            ContainerShape::Map => Value::Map(
                values
                    .map(|pair| match pair {
                        Value::Tuple(mut kv) if kv.len() == 2 => {
                            let value = kv.pop().expect("pair has two items");
                            let key = kv.pop().expect("pair has two items");
                            (key, value)
                        }
                        _ => unreachable!("map children are key-value pairs"),
                    })
                    .collect(),
            ),
        })
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Plan {
    /// The clone shares node handles with the original; its scope stack
    /// starts empty.
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            lineage: self.lineage,
            scope: Vec::new(),
        }
    }
}
