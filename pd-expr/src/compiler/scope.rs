use super::ir::BlockVariable;
use crate::types::Type;

#[derive(Clone, Debug)]
pub(crate) struct Variable {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) slot: u16,
    references: usize,
    synthetic: bool,
}

/// Lexical frames over a flat variable table. Slots are never reused, so a
/// slot uniquely identifies one declaration within a function.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    variables: Vec<Variable>,
    frames: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeclareError {
    AlreadyDeclared,
    TooManyLocals,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self {
            variables: Vec::new(),
            frames: vec![Vec::new()],
        }
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Closes the innermost frame and returns the variables worth keeping:
    /// synthetic ones and those read after their declaration.
    pub(crate) fn pop(&mut self) -> Vec<BlockVariable> {
        let frame = self.frames.pop().unwrap_or_default();
        frame
            .into_iter()
            .map(|index| &self.variables[index])
            .filter(|variable| variable.synthetic || variable.references > 0)
            .map(|variable| BlockVariable {
                name: variable.name.clone(),
                slot: variable.slot,
                ty: variable.ty.clone(),
            })
            .collect()
    }

    pub(crate) fn declare(&mut self, name: &str, ty: Type) -> Result<u16, DeclareError> {
        if self.is_visible(name) {
            return Err(DeclareError::AlreadyDeclared);
        }
        self.insert(name.to_string(), ty, false)
    }

    /// Declares a compiler-generated variable; `name` is never spellable in
    /// source so it cannot collide with user declarations.
    pub(crate) fn declare_synthetic(&mut self, name: String, ty: Type) -> Result<u16, DeclareError> {
        self.insert(name, ty, true)
    }

    fn insert(&mut self, name: String, ty: Type, synthetic: bool) -> Result<u16, DeclareError> {
        let slot = u16::try_from(self.variables.len()).map_err(|_| DeclareError::TooManyLocals)?;
        self.variables.push(Variable {
            name,
            ty,
            slot,
            references: 0,
            synthetic,
        });
        let index = self.variables.len() - 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.push(index);
        }
        Ok(slot)
    }

    pub(crate) fn is_visible(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Looks a name up through the enclosing frames and counts the reference.
    pub(crate) fn lookup(&mut self, name: &str) -> Option<&Variable> {
        let index = self.find(name)?;
        let variable = &mut self.variables[index];
        variable.references += 1;
        Some(variable)
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .copied()
            .find(|index| self.variables[*index].name == name)
    }

    pub(crate) fn local_count(&self) -> usize {
        self.variables.len()
    }
}
