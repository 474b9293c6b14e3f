/// Widest bit-vector the toolchain handles (values are carried in `u128`).
pub const MAX_BV_WIDTH: u32 = 128;

/// SMT sorts of the QF_BV fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtSort {
    Bool,
    BitVec(u32),
}

impl SmtSort {
    pub fn bv(width: u32) -> Self {
        SmtSort::BitVec(width)
    }

    /// Bits needed to represent one value of this sort.
    pub fn bit_width(&self) -> u32 {
        match self {
            SmtSort::Bool => 1,
            SmtSort::BitVec(width) => *width,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            SmtSort::Bool => true,
            SmtSort::BitVec(width) => (1..=MAX_BV_WIDTH).contains(width),
        }
    }
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "bool"),
            SmtSort::BitVec(width) => write!(f, "bv{width}"),
        }
    }
}
