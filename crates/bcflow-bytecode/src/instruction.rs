//! Decoded instruction records

use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;

/// Constant operand of `LOAD_CONST`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Anything the decoder could only render (code objects, tuples, ...)
    Repr(String),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Repr(repr) => f.write_str(repr),
        }
    }
}

/// Resolved instruction argument (`dis.Instruction.argval`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// Constant pool entry
    Const(Constant),
    /// Local, global or attribute name
    Name(String),
    /// Plain integer (argument counts, operator selectors, ...)
    Int(i64),
    /// Absolute jump target offset
    Target(u32),
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode
    pub opcode: Opcode,
    /// Raw numeric argument
    #[serde(default)]
    pub arg: Option<u32>,
    /// Resolved argument
    #[serde(default)]
    pub argval: Option<ArgValue>,
    /// Byte offset within the code object
    pub offset: u32,
}

impl Instruction {
    /// Create an instruction without an argument
    pub fn new(opcode: Opcode, offset: u32) -> Self {
        Self {
            opcode,
            arg: None,
            argval: None,
            offset,
        }
    }

    /// Attach the raw numeric argument
    pub fn with_arg(mut self, arg: u32) -> Self {
        self.arg = Some(arg);
        self
    }

    /// Attach the resolved argument
    pub fn with_argval(mut self, argval: ArgValue) -> Self {
        self.argval = Some(argval);
        self
    }

    /// Name operand, if the argument resolved to one
    pub fn name(&self) -> Option<&str> {
        match &self.argval {
            Some(ArgValue::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// Integer operand: the resolved integer if present, else the raw argument
    pub fn int_arg(&self) -> Option<i64> {
        match &self.argval {
            Some(ArgValue::Int(value)) => Some(*value),
            _ => self.arg.map(i64::from),
        }
    }

    /// Constant operand of `LOAD_CONST`
    pub fn constant(&self) -> Option<&Constant> {
        match &self.argval {
            Some(ArgValue::Const(constant)) => Some(constant),
            _ => None,
        }
    }

    /// Operator selected by a `BINARY_OP`
    pub fn binary_operator(&self) -> Option<BinaryOperator> {
        if self.opcode != Opcode::BinaryOp {
            return None;
        }
        self.arg.and_then(BinaryOperator::from_arg)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>4} {}", self.offset, self.opcode)?;
        if !self.opcode.has_argument() {
            return Ok(());
        }
        if let Some(op) = self.binary_operator() {
            return write!(f, " ({})", op.symbol());
        }
        if let Some(constant) = self.constant() {
            return write!(f, " ({constant})");
        }
        match &self.argval {
            Some(ArgValue::Name(name)) => write!(f, " ({name})"),
            Some(ArgValue::Int(value)) => write!(f, " {value}"),
            Some(ArgValue::Target(target)) => write!(f, " (to {target})"),
            _ => match self.arg {
                Some(arg) => write!(f, " {arg}"),
                None => Ok(()),
            },
        }
    }
}

/// `BINARY_OP` operator selector (`NB_*` constants)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `&`
    And,
    /// `//`
    FloorDivide,
    /// `<<`
    Lshift,
    /// `@`
    MatrixMultiply,
    /// `*`
    Multiply,
    /// `%`
    Remainder,
    /// `|`
    Or,
    /// `**`
    Power,
    /// `>>`
    Rshift,
    /// `-`
    Subtract,
    /// `/`
    TrueDivide,
    /// `^`
    Xor,
    /// In-place form of the wrapped operator (`+=`, ...)
    InPlace(InPlaceOperator),
}

/// Operators with an in-place `NB_INPLACE_*` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InPlaceOperator {
    /// `+=`
    Add,
    /// `&=`
    And,
    /// `//=`
    FloorDivide,
    /// `<<=`
    Lshift,
    /// `@=`
    MatrixMultiply,
    /// `*=`
    Multiply,
    /// `%=`
    Remainder,
    /// `|=`
    Or,
    /// `**=`
    Power,
    /// `>>=`
    Rshift,
    /// `-=`
    Subtract,
    /// `/=`
    TrueDivide,
    /// `^=`
    Xor,
}

const NB_INPLACE_OFFSET: u32 = 13;

impl BinaryOperator {
    /// Decode the `BINARY_OP` argument
    pub fn from_arg(arg: u32) -> Option<Self> {
        if arg >= NB_INPLACE_OFFSET {
            return InPlaceOperator::from_arg(arg - NB_INPLACE_OFFSET).map(Self::InPlace);
        }
        let op = match arg {
            0 => Self::Add,
            1 => Self::And,
            2 => Self::FloorDivide,
            3 => Self::Lshift,
            4 => Self::MatrixMultiply,
            5 => Self::Multiply,
            6 => Self::Remainder,
            7 => Self::Or,
            8 => Self::Power,
            9 => Self::Rshift,
            10 => Self::Subtract,
            11 => Self::TrueDivide,
            12 => Self::Xor,
            _ => return None,
        };
        Some(op)
    }

    /// Source-level spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::And => "&",
            Self::FloorDivide => "//",
            Self::Lshift => "<<",
            Self::MatrixMultiply => "@",
            Self::Multiply => "*",
            Self::Remainder => "%",
            Self::Or => "|",
            Self::Power => "**",
            Self::Rshift => ">>",
            Self::Subtract => "-",
            Self::TrueDivide => "/",
            Self::Xor => "^",
            Self::InPlace(op) => op.symbol(),
        }
    }
}

impl InPlaceOperator {
    fn from_arg(arg: u32) -> Option<Self> {
        let op = match arg {
            0 => Self::Add,
            1 => Self::And,
            2 => Self::FloorDivide,
            3 => Self::Lshift,
            4 => Self::MatrixMultiply,
            5 => Self::Multiply,
            6 => Self::Remainder,
            7 => Self::Or,
            8 => Self::Power,
            9 => Self::Rshift,
            10 => Self::Subtract,
            11 => Self::TrueDivide,
            12 => Self::Xor,
            _ => return None,
        };
        Some(op)
    }

    /// Source-level spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+=",
            Self::And => "&=",
            Self::FloorDivide => "//=",
            Self::Lshift => "<<=",
            Self::MatrixMultiply => "@=",
            Self::Multiply => "*=",
            Self::Remainder => "%=",
            Self::Or => "|=",
            Self::Power => "**=",
            Self::Rshift => ">>=",
            Self::Subtract => "-=",
            Self::TrueDivide => "/=",
            Self::Xor => "^=",
        }
    }
}
