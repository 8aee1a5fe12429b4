use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{StandardCatalog, TypeCatalog};
use crate::compiler::dialect::Dialect;
use crate::compiler::{ParseResult, SourceError, SourceFlavor, compile_source, frontends, ir};
use crate::function::{CompiledFunction, FunctionArgs, TypedFunction, signature_of};
use crate::types::Signature;
use crate::value::ValueType;

pub const FLAVOR_ENV: &str = "PD_EXPR_FLAVOR";
pub const MAX_DEPTH_ENV: &str = "PD_EXPR_MAX_DEPTH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownFlavor(String),
    InvalidDepth(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownFlavor(value) => {
                write!(f, "{FLAVOR_ENV}: unknown flavor '{value}'")
            }
            ConfigError::InvalidDepth(value) => {
                write!(f, "{MAX_DEPTH_ENV}: expected a positive integer, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub flavor: SourceFlavor,
    /// Bound on expression nesting. `None` leaves recursion unbounded.
    pub max_nesting_depth: Option<usize>,
}

impl EngineOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads options through `lookup`; unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(raw) = lookup(FLAVOR_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                options.flavor = SourceFlavor::from_name(raw)
                    .ok_or_else(|| ConfigError::UnknownFlavor(raw.to_string()))?;
            }
        }
        if let Some(raw) = lookup(MAX_DEPTH_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                let depth = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|depth| *depth > 0)
                    .ok_or_else(|| ConfigError::InvalidDepth(raw.to_string()))?;
                options.max_nesting_depth = Some(depth);
            }
        }
        Ok(options)
    }
}

/// Compiles declarations against a dialect and a type catalog. Cloning is
/// cheap and clones share both.
#[derive(Clone)]
pub struct Engine {
    dialect: Arc<Dialect>,
    catalog: Arc<dyn TypeCatalog>,
    options: EngineOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect.name())
            .field("options", &self.options)
            .finish()
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            dialect: frontends::dialect(options.flavor),
            catalog: Arc::new(StandardCatalog::new()),
            options,
        }
    }

    pub fn with_catalog(mut self, catalog: impl TypeCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_shared_catalog(mut self, catalog: Arc<dyn TypeCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Swaps in a custom dialect, e.g. one built with `Dialect::builder`.
    pub fn with_dialect(mut self, dialect: Arc<Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn catalog(&self) -> &dyn TypeCatalog {
        self.catalog.as_ref()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn compile(
        &self,
        source: &str,
        signature: &Signature,
    ) -> Result<CompiledFunction, SourceError> {
        self.compile_with(source, Some(signature))
    }

    pub fn compile_typed<Args: FunctionArgs, Ret: ValueType>(
        &self,
        source: &str,
    ) -> Result<TypedFunction<Args, Ret>, SourceError> {
        let signature = signature_of::<Args, Ret>();
        self.compile(source, &signature).map(TypedFunction::new)
    }

    /// Compiles a declaration whose parameter types are written in the
    /// source; the return type is the body's type.
    pub fn compile_inferred(&self, source: &str) -> Result<CompiledFunction, SourceError> {
        self.compile_with(source, None)
    }

    /// Typed IR without code generation.
    pub fn lower(&self, source: &str, signature: Option<&Signature>) -> ParseResult<ir::Function> {
        crate::compiler::lower_function(
            source,
            &self.dialect,
            self.catalog.as_ref(),
            signature,
            self.options.max_nesting_depth,
        )
    }

    fn compile_with(
        &self,
        source: &str,
        signature: Option<&Signature>,
    ) -> Result<CompiledFunction, SourceError> {
        debug!(
            dialect = self.dialect.name(),
            params = signature.map(|signature| signature.params.len()),
            "compiling declaration"
        );
        let result = compile_source(
            source,
            &self.dialect,
            self.catalog.as_ref(),
            signature,
            self.options.max_nesting_depth,
        );
        match result {
            Ok((signature, program)) => Ok(CompiledFunction::new(signature, program)),
            Err(err) => {
                match &err {
                    SourceError::Parse(parse) => debug!(
                        code = parse.code(),
                        offset = parse.offset,
                        "declaration rejected: {}",
                        parse.message
                    ),
                    SourceError::Compile(compile) => {
                        debug!("code generation failed: {compile}")
                    }
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_when_unset() {
        let options = EngineOptions::from_lookup(|_| None).expect("defaults");
        assert_eq!(options, EngineOptions::default());
        assert_eq!(options.flavor, SourceFlavor::CSharp);
        assert_eq!(options.max_nesting_depth, None);
    }

    #[test]
    fn options_read_flavor_and_depth() {
        let options = EngineOptions::from_lookup(|key| match key {
            FLAVOR_ENV => Some("excel".to_string()),
            MAX_DEPTH_ENV => Some(" 64 ".to_string()),
            _ => None,
        })
        .expect("valid options");
        assert_eq!(options.flavor, SourceFlavor::Formula);
        assert_eq!(options.max_nesting_depth, Some(64));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let err = EngineOptions::from_lookup(|key| {
            (key == FLAVOR_ENV).then(|| "cobol".to_string())
        })
        .expect_err("unknown flavor");
        assert_eq!(err, ConfigError::UnknownFlavor("cobol".to_string()));

        let err = EngineOptions::from_lookup(|key| {
            (key == MAX_DEPTH_ENV).then(|| "0".to_string())
        })
        .expect_err("zero depth");
        assert!(matches!(err, ConfigError::InvalidDepth(_)));
    }

    #[test]
    fn engines_are_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Engine>();
    }
}
