//! Symbolic callables and their structural signatures.
//!
//! A [`SymFn`] pairs a name with a native closure and a [`Signature`]
//! describing how arguments bind to it. Binding is validated eagerly when a
//! call is added to a plan, so argument mistakes surface at construction
//! time rather than hours into a run.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Positional and keyword argument values for one invocation.
#[derive(Debug, Clone, Default)]
pub struct CallInput {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl CallInput {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Resolve the input into the signature's declared parameter order.
    ///
    /// Only sound after [`Signature::bind`] accepted the same shape.
    pub fn flatten(mut self, signature: &Signature) -> anyhow::Result<Vec<Value>> {
        let mut ordered: Vec<Option<Value>> = self.args.drain(..).map(Some).collect();
        ordered.resize_with(signature.params.len().max(ordered.len()), || None);
        for (name, value) in self.kwargs.drain(..) {
            let index = signature
                .params
                .iter()
                .position(|param| param.name == name)
                .ok_or_else(|| anyhow::anyhow!("no parameter named '{name}'"))?;
            ordered[index] = Some(value);
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| anyhow::anyhow!("parameter {index} was not bound"))
            })
            .collect()
    }
}

/// A failure to bind arguments to a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("takes {expected} positional argument(s) but {got} were given")]
    TooManyPositional { expected: usize, got: usize },
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("got multiple values for argument '{0}'")]
    DuplicateArgument(String),
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
}

/// A declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub required: bool,
    pub keyword_only: bool,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            keyword_only: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            keyword_only: false,
        }
    }

    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            keyword_only: true,
        }
    }
}

/// Structural description of how arguments bind to a callable.
///
/// The shape is declared when the callable is registered and checked when
/// calls are built, so binding mistakes fail at construction time.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
    variadic: bool,
    keyword_variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self {
            params,
            variadic: false,
            keyword_variadic: false,
        }
    }

    /// A signature of required positional-or-keyword parameters.
    pub fn positional<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(names.into_iter().map(Param::required).collect())
    }

    /// A signature accepting any number of positional arguments.
    pub fn variadic() -> Self {
        Self {
            params: Vec::new(),
            variadic: true,
            keyword_variadic: false,
        }
    }

    pub fn with_variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn with_keyword_variadic(mut self) -> Self {
        self.keyword_variadic = true;
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Check that `positional` arguments and the named keywords bind.
    pub fn bind(&self, positional: usize, keywords: &[&str]) -> Result<(), BindError> {
        let positional_capacity = self
            .params
            .iter()
            .filter(|param| !param.keyword_only)
            .count();
        if positional > positional_capacity && !self.variadic {
            return Err(BindError::TooManyPositional {
                expected: positional_capacity,
                got: positional,
            });
        }

        let mut bound = vec![false; self.params.len()];
        let mut filled = 0usize;
        for (index, param) in self.params.iter().enumerate() {
            if filled == positional.min(positional_capacity) {
                break;
            }
            if !param.keyword_only {
                bound[index] = true;
                filled += 1;
            }
        }

        for &name in keywords {
            match self.params.iter().position(|param| param.name == name) {
                Some(index) if bound[index] => {
                    return Err(BindError::DuplicateArgument(name.to_string()));
                }
                Some(index) => bound[index] = true,
                None if self.keyword_variadic => {}
                None => return Err(BindError::UnexpectedKeyword(name.to_string())),
            }
        }

        for (index, param) in self.params.iter().enumerate() {
            if param.required && !bound[index] {
                return Err(BindError::MissingArgument(param.name.clone()));
            }
        }
        Ok(())
    }
}

type NativeFn = dyn Fn(CallInput) -> anyhow::Result<Value> + Send + Sync;

/// A named callable that can appear in a plan.
#[derive(Clone)]
pub struct SymFn {
    name: Arc<str>,
    signature: Arc<Signature>,
    native: Arc<NativeFn>,
}

impl SymFn {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        f: impl Fn(CallInput) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into().into(),
            signature: Arc::new(signature),
            native: Arc::new(f),
        }
    }

    pub fn nullary(
        name: impl Into<String>,
        f: impl Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, Signature::new(Vec::new()), move |_| f())
    }

    pub fn unary(
        name: impl Into<String>,
        param: &str,
        f: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let signature = Signature::positional([param]);
        let resolver = signature.clone();
        Self::new(name, signature, move |input| {
            let mut values = input.flatten(&resolver)?;
            f(values.remove(0))
        })
    }

    pub fn binary(
        name: impl Into<String>,
        params: [&str; 2],
        f: impl Fn(Value, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let signature = Signature::positional(params);
        let resolver = signature.clone();
        Self::new(name, signature, move |input| {
            let mut values = input.flatten(&resolver)?;
            let b = values.remove(1);
            let a = values.remove(0);
            f(a, b)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn invoke(&self, input: CallInput) -> anyhow::Result<Value> {
        (self.native)(input)
    }
}

impl fmt::Debug for SymFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymFn").field("name", &self.name).finish()
    }
}
