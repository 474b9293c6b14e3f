use rotor_smt::sorts::SmtSort;

/// Source location information (byte offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A spanned AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Untyped syntax tree of a `.bvp` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: Spanned<String>,
    pub decls: Vec<Spanned<Decl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Input {
        name: Spanned<String>,
        sort: Spanned<SortSyntax>,
    },
    Let {
        name: Spanned<String>,
        sort: Spanned<SortSyntax>,
        expr: Spanned<Expr>,
    },
    Output {
        name: Spanned<String>,
        sort: Spanned<SortSyntax>,
        expr: Spanned<Expr>,
    },
}

impl Decl {
    pub fn name(&self) -> &Spanned<String> {
        match self {
            Decl::Input { name, .. } | Decl::Let { name, .. } | Decl::Output { name, .. } => name,
        }
    }
}

/// A sort as written; widths are validated by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortSyntax {
    Bool,
    BitVec(u64),
}

impl SortSyntax {
    pub fn to_sort(self) -> Option<SmtSort> {
        match self {
            SortSyntax::Bool => Some(SmtSort::Bool),
            SortSyntax::BitVec(width) => {
                let sort = SmtSort::BitVec(u32::try_from(width).ok()?);
                sort.is_valid().then_some(sort)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(String),
    BoolLit(bool),
    /// `#x..` / `#b..`; the width follows from the digit count.
    BvLit {
        value: u128,
        width: u32,
    },
    /// `(op numeral* expr*)`
    App {
        op: Spanned<String>,
        indices: Vec<Spanned<u128>>,
        args: Vec<Spanned<Expr>>,
    },
}
