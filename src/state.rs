// This module implements the qualified name (State) used to address every scope and
// symbol in a compilation unit. A State is an ordered sequence of AddressFrames, each
// carrying a simple name plus the kind of declaration that introduced it. The same
// mutable State doubles as the traversal scratch stack of every pass: visitors push a
// frame when entering a lexical scope and pop it on the way out, and clone the stack
// whenever the address has to outlive the traversal (symbols, IR operands, map keys).
// Equality and hashing only look at the frame names so that a State built from a
// dotted reference compares equal to the State recorded at declaration time.

//! Qualified names and address frames.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

/// Kind of declaration or reference a frame stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Library,
    SystemType,
    DataType,
    TypeAlias,
    Function,
    VariableDeclaration,
    VariableExpression,
    VariableStatement,
    Block,
    Call,
    IdentifierCall,
    FunctionCall,
}

impl AddressKind {
    /// Outward symbol search never crosses a frame of this kind.
    pub fn is_library_boundary(self) -> bool {
        matches!(self, AddressKind::Library)
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            AddressKind::SystemType | AddressKind::DataType | AddressKind::TypeAlias
        )
    }

    /// Frames that open a named declaration scope (as opposed to blocks and calls).
    pub fn is_declaration(self) -> bool {
        self.is_type() || matches!(self, AddressKind::Library | AddressKind::Function)
    }

    pub fn is_variable(self) -> bool {
        matches!(
            self,
            AddressKind::VariableDeclaration
                | AddressKind::VariableExpression
                | AddressKind::VariableStatement
        )
    }
}

/// One segment of a qualified name.
#[derive(Debug, Clone)]
pub struct AddressFrame {
    pub name: String,
    pub kind: AddressKind,
    /// Resolved data type of the entity this frame names, when known.
    pub data_type: Option<State>,
    pub is_last: bool,
}

impl AddressFrame {
    pub fn new(name: impl Into<String>, kind: AddressKind) -> Self {
        Self {
            name: name.into(),
            kind,
            data_type: None,
            is_last: false,
        }
    }

    pub fn with_data_type(mut self, data_type: State) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

impl PartialEq for AddressFrame {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AddressFrame {}

impl Hash for AddressFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Fully qualified address of a scope or symbol.
///
/// The empty State addresses the root scope of a compilation. Every other
/// State is a dotted path such as `lib.Point.x`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct State {
    frames: Vec<AddressFrame>,
}

impl State {
    /// The root scope.
    pub fn root() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn from_frames(frames: Vec<AddressFrame>) -> Self {
        Self { frames }
    }

    /// Build a State where every frame has the same kind.
    pub fn from_names<I, S>(names: I, kind: AddressKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: names
                .into_iter()
                .map(|name| AddressFrame::new(name, kind))
                .collect(),
        }
    }

    pub fn push(&mut self, frame: AddressFrame) {
        self.frames.push(frame);
    }

    /// Pop the innermost frame. Popping the root is an internal invariant violation.
    pub fn pop(&mut self) -> CompileResult<AddressFrame> {
        self.frames.pop().ok_or(CompileError::StateUnderflow {
            context: "pop on an empty scope stack",
        })
    }

    /// Non-mutating push.
    pub fn with(&self, frame: AddressFrame) -> State {
        let mut next = self.clone();
        next.push(frame);
        next
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[AddressFrame] {
        &self.frames
    }

    pub fn first(&self) -> Option<&AddressFrame> {
        self.frames.first()
    }

    pub fn last(&self) -> Option<&AddressFrame> {
        self.frames.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut AddressFrame> {
        self.frames.last_mut()
    }

    /// Simple name of the innermost frame.
    pub fn name(&self) -> Option<&str> {
        self.frames.last().map(|f| f.name.as_str())
    }

    /// The enclosing scope, or `None` for the root.
    pub fn parent(&self) -> Option<State> {
        if self.frames.is_empty() {
            return None;
        }
        Some(Self {
            frames: self.frames[..self.frames.len() - 1].to_vec(),
        })
    }

    /// True when `self` lies inside `other` (or is `other`).
    pub fn is_child_of(&self, other: &State) -> bool {
        other.frames.len() <= self.frames.len()
            && self.frames[..other.frames.len()] == other.frames[..]
    }

    pub fn is_parent_of(&self, other: &State) -> bool {
        other.is_child_of(self)
    }

    /// Trim trailing block/call frames so the State names the innermost declaration.
    pub fn enclosing_declaration(&self) -> State {
        let end = self
            .frames
            .iter()
            .rposition(|f| f.kind.is_declaration())
            .map_or(0, |idx| idx + 1);
        Self {
            frames: self.frames[..end].to_vec(),
        }
    }

    /// Innermost enclosing function scope, if any.
    pub fn enclosing_function(&self) -> Option<State> {
        let idx = self
            .frames
            .iter()
            .rposition(|f| f.kind == AddressKind::Function)?;
        Some(Self {
            frames: self.frames[..=idx].to_vec(),
        })
    }

    /// Marks the innermost frame as the final segment of a reference.
    pub fn mark_last(&mut self) {
        for frame in &mut self.frames {
            frame.is_last = false;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.is_last = true;
        }
    }
}

impl Add<&State> for &State {
    type Output = State;

    fn add(self, rhs: &State) -> State {
        let mut frames = Vec::with_capacity(self.frames.len() + rhs.frames.len());
        frames.extend_from_slice(&self.frames);
        frames.extend_from_slice(&rhs.frames);
        State { frames }
    }
}

impl Sub<&State> for &State {
    type Output = State;

    /// Removes the longest common trailing run of frames.
    fn sub(self, rhs: &State) -> State {
        let common = self
            .frames
            .iter()
            .rev()
            .zip(rhs.frames.iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        State {
            frames: self.frames[..self.frames.len() - common].to_vec(),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return write!(f, "<root>");
        }
        for (idx, frame) in self.frames.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", frame.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(path: &str) -> State {
        if path.is_empty() {
            return State::root();
        }
        State::from_names(path.split('.'), AddressKind::Block)
    }

    #[test]
    fn test_concat_then_subtract_restores_prefix() {
        let a = st("lib.Point");
        let b = st("move.x");
        let joined = &a + &b;
        assert_eq!(joined.to_string(), "lib.Point.move.x");
        assert_eq!(&joined - &b, a);
    }

    #[test]
    fn test_concat_is_associative() {
        let (a, b, c) = (st("a"), st("b.c"), st("d"));
        assert_eq!(&(&a + &b) + &c, &a + &(&b + &c));
    }

    #[test]
    fn test_subtract_without_common_suffix_is_identity() {
        let a = st("lib.f");
        assert_eq!(&a - &st("g"), a);
        assert_eq!(&st("a.b.c") - &st("x.b.c"), st("a"));
    }

    #[test]
    fn test_child_parent_relationship() {
        let outer = st("lib.Point");
        let inner = st("lib.Point.x");
        assert!(inner.is_child_of(&outer));
        assert!(outer.is_parent_of(&inner));
        assert!(!outer.is_child_of(&inner));
        // Equal states are each other's child and nothing else.
        assert!(outer.is_child_of(&outer.clone()));
        assert!(!st("lib.Pointer").is_child_of(&st("lib.Point.x")));
    }

    #[test]
    fn test_equality_ignores_kind() {
        let declared = State::from_names(["lib", "x"], AddressKind::VariableDeclaration);
        let referenced = State::from_names(["lib", "x"], AddressKind::IdentifierCall);
        assert_eq!(declared, referenced);

        let mut set = std::collections::HashSet::new();
        set.insert(declared);
        assert!(set.contains(&referenced));
    }

    #[test]
    fn test_pop_underflow_is_an_error() {
        let mut state = st("a");
        assert!(state.pop().is_ok());
        assert!(matches!(
            state.pop(),
            Err(CompileError::StateUnderflow { .. })
        ));
    }

    #[test]
    fn test_enclosing_declaration_strips_blocks() {
        let mut state = State::root();
        state.push(AddressFrame::new("lib", AddressKind::Library));
        state.push(AddressFrame::new("main", AddressKind::Function));
        state.push(AddressFrame::new("$block:4", AddressKind::Block));
        state.push(AddressFrame::new("$if:9", AddressKind::Block));
        assert_eq!(state.enclosing_declaration().to_string(), "lib.main");
        assert_eq!(
            state.enclosing_function().map(|s| s.to_string()),
            Some("lib.main".to_string())
        );
    }
}
