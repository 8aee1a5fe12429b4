use expr::{Engine, EngineOptions, SourceError, SourceFlavor, render_source_error};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintSpan {
    pub start_col: usize,
    pub end_col: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintDiagnostic {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub code: &'static str,
    pub message: String,
    pub span: LintSpan,
    pub rendered: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintReport {
    pub diagnostics: Vec<LintDiagnostic>,
}

impl LintReport {
    pub fn ok() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    // used for tests
    #[allow(dead_code)]
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Compiles `source` with written parameter types and reports the first
/// error, if any.
pub fn lint_source_with_flavor(source: &str, flavor: SourceFlavor) -> LintReport {
    let engine = Engine::new(EngineOptions {
        flavor,
        ..EngineOptions::default()
    });
    match engine.compile_inferred(source) {
        Ok(_) => LintReport::ok(),
        Err(SourceError::Parse(err)) => {
            let (line, column) = err.line_col(source);
            let width = err.token.chars().count().max(1);
            LintReport {
                diagnostics: vec![LintDiagnostic {
                    line,
                    column,
                    offset: err.offset,
                    code: err.code(),
                    span: LintSpan {
                        start_col: column,
                        end_col: column + width,
                    },
                    rendered: render_source_error(source, "<lint>", &err, false),
                    message: err.message,
                }],
            }
        }
        Err(err) => LintReport {
            diagnostics: vec![LintDiagnostic {
                line: 1,
                column: 1,
                offset: 0,
                code: "E_COMPILE",
                message: err.to_string(),
                span: LintSpan {
                    start_col: 1,
                    end_col: 1,
                },
                rendered: err.to_string(),
            }],
        },
    }
}
