//! Built-in dialects. Each frontend only supplies registry data; parsing is
//! shared by every flavor.

use std::sync::{Arc, OnceLock};

mod csharp;
mod formula;

use super::SourceFlavor;
use super::dialect::Dialect;

static CSHARP: OnceLock<Arc<Dialect>> = OnceLock::new();
static FORMULA: OnceLock<Arc<Dialect>> = OnceLock::new();

/// Shared, validated dialect for a flavor.
pub fn dialect(flavor: SourceFlavor) -> Arc<Dialect> {
    Arc::clone(cell(flavor))
}

pub(crate) fn dialect_for(flavor: SourceFlavor) -> &'static Dialect {
    cell(flavor)
}

fn cell(flavor: SourceFlavor) -> &'static Arc<Dialect> {
    match flavor {
        SourceFlavor::CSharp => CSHARP.get_or_init(|| {
            Arc::new(csharp::dialect().expect("built-in C#-style dialect must validate"))
        }),
        SourceFlavor::Formula => FORMULA.get_or_init(|| {
            Arc::new(formula::dialect().expect("built-in formula dialect must validate"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_dialects_validate() {
        assert_eq!(dialect(SourceFlavor::CSharp).name(), "csharp");
        assert_eq!(dialect(SourceFlavor::Formula).name(), "formula");
        assert!(Arc::ptr_eq(
            &dialect(SourceFlavor::CSharp),
            &dialect(SourceFlavor::CSharp)
        ));
    }
}
