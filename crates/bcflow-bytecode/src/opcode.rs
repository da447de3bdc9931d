//! CPython 3.11 opcodes

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};

macro_rules! define_opcodes {
    ($( $(#[$meta:meta])* $variant:ident = $byte:literal => $name:literal, )*) => {
        /// Bytecode opcodes
        ///
        /// The full CPython 3.11 instruction set. Only a subset has a dataflow
        /// translation rule; the rest exist so that decoded instructions always
        /// carry a well-formed opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(into = "&'static str")]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$meta])* $variant = $byte, )*
        }

        impl Opcode {
            /// Every opcode, in numeric order
            pub const ALL: &'static [Opcode] = &[$( Self::$variant, )*];

            /// Decode from raw byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Get the `dis` name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }
    };
}

define_opcodes! {
    // ==================== No argument ====================
    /// Inline cache entry
    Cache = 0 => "CACHE",
    /// Discard top of stack
    PopTop = 1 => "POP_TOP",
    /// Push a NULL marker for the call protocol
    PushNull = 2 => "PUSH_NULL",
    /// Do nothing
    Nop = 9 => "NOP",
    /// `+tos`
    UnaryPositive = 10 => "UNARY_POSITIVE",
    /// `-tos`
    UnaryNegative = 11 => "UNARY_NEGATIVE",
    /// `not tos`
    UnaryNot = 12 => "UNARY_NOT",
    /// `~tos`
    UnaryInvert = 15 => "UNARY_INVERT",
    /// `tos1[tos]`
    BinarySubscr = 25 => "BINARY_SUBSCR",
    /// Push `len(tos)`
    GetLen = 30 => "GET_LEN",
    /// Pattern matching: mapping check
    MatchMapping = 31 => "MATCH_MAPPING",
    /// Pattern matching: sequence check
    MatchSequence = 32 => "MATCH_SEQUENCE",
    /// Pattern matching: key extraction
    MatchKeys = 33 => "MATCH_KEYS",
    /// Push the current exception
    PushExcInfo = 35 => "PUSH_EXC_INFO",
    /// Exception match test
    CheckExcMatch = 36 => "CHECK_EXC_MATCH",
    /// Exception group match test
    CheckEgMatch = 37 => "CHECK_EG_MATCH",
    /// Call `__exit__` on exception
    WithExceptStart = 49 => "WITH_EXCEPT_START",
    /// `aiter(tos)`
    GetAiter = 50 => "GET_AITER",
    /// `anext(tos)`
    GetAnext = 51 => "GET_ANEXT",
    /// Enter an async context manager
    BeforeAsyncWith = 52 => "BEFORE_ASYNC_WITH",
    /// Enter a context manager
    BeforeWith = 53 => "BEFORE_WITH",
    /// Terminate an `async for` loop
    EndAsyncFor = 54 => "END_ASYNC_FOR",
    /// `tos1[tos] = tos2`
    StoreSubscr = 60 => "STORE_SUBSCR",
    /// `del tos1[tos]`
    DeleteSubscr = 61 => "DELETE_SUBSCR",
    /// `iter(tos)`
    GetIter = 68 => "GET_ITER",
    /// Iterator for `yield from`
    GetYieldFromIter = 69 => "GET_YIELD_FROM_ITER",
    /// Interactive-mode expression print
    PrintExpr = 70 => "PRINT_EXPR",
    /// Push `builtins.__build_class__`
    LoadBuildClass = 71 => "LOAD_BUILD_CLASS",
    /// Push `AssertionError`
    LoadAssertionError = 74 => "LOAD_ASSERTION_ERROR",
    /// Create a generator from the current frame
    ReturnGenerator = 75 => "RETURN_GENERATOR",
    /// `tuple(tos)`
    ListToTuple = 82 => "LIST_TO_TUPLE",
    /// Return top of stack to the caller
    ReturnValue = 83 => "RETURN_VALUE",
    /// `from module import *`
    ImportStar = 84 => "IMPORT_STAR",
    /// Create `__annotations__`
    SetupAnnotations = 85 => "SETUP_ANNOTATIONS",
    /// Yield top of stack
    YieldValue = 86 => "YIELD_VALUE",
    /// Wrap an async generator value
    AsyncGenWrap = 87 => "ASYNC_GEN_WRAP",
    /// Re-raise for `except*`
    PrepReraiseStar = 88 => "PREP_RERAISE_STAR",
    /// Restore the previous exception state
    PopExcept = 89 => "POP_EXCEPT",

    // ==================== With argument ====================
    /// `name = tos`
    StoreName = 90 => "STORE_NAME",
    /// `del name`
    DeleteName = 91 => "DELETE_NAME",
    /// Unpack a sequence into `count` values
    UnpackSequence = 92 => "UNPACK_SEQUENCE",
    /// Advance the iterator on top of stack
    ForIter = 93 => "FOR_ITER",
    /// Starred unpacking
    UnpackEx = 94 => "UNPACK_EX",
    /// `tos.name = tos1`
    StoreAttr = 95 => "STORE_ATTR",
    /// `del tos.name`
    DeleteAttr = 96 => "DELETE_ATTR",
    /// `global name = tos`
    StoreGlobal = 97 => "STORE_GLOBAL",
    /// `del global name`
    DeleteGlobal = 98 => "DELETE_GLOBAL",
    /// Swap top of stack with the i-th element
    Swap = 99 => "SWAP",
    /// Push `co_consts[consti]`
    LoadConst = 100 => "LOAD_CONST",
    /// Push the value bound to `name`
    LoadName = 101 => "LOAD_NAME",
    /// Build a tuple from `count` values
    BuildTuple = 102 => "BUILD_TUPLE",
    /// Build a list from `count` values
    BuildList = 103 => "BUILD_LIST",
    /// Build a set from `count` values
    BuildSet = 104 => "BUILD_SET",
    /// Build a dict from `count` pairs
    BuildMap = 105 => "BUILD_MAP",
    /// `getattr(tos, name)`
    LoadAttr = 106 => "LOAD_ATTR",
    /// Rich comparison
    CompareOp = 107 => "COMPARE_OP",
    /// Import a module
    ImportName = 108 => "IMPORT_NAME",
    /// Load an attribute from an imported module
    ImportFrom = 109 => "IMPORT_FROM",
    /// Relative forward jump
    JumpForward = 110 => "JUMP_FORWARD",
    /// Pop and jump forward if false
    PopJumpForwardIfFalse = 114 => "POP_JUMP_FORWARD_IF_FALSE",
    /// Pop and jump forward if true
    PopJumpForwardIfTrue = 115 => "POP_JUMP_FORWARD_IF_TRUE",
    /// Push a global (or builtin) by name
    LoadGlobal = 116 => "LOAD_GLOBAL",
    /// `is` / `is not`
    IsOp = 117 => "IS_OP",
    /// `in` / `not in`
    ContainsOp = 118 => "CONTAINS_OP",
    /// Re-raise the exception on top of stack
    Reraise = 119 => "RERAISE",
    /// Push a copy of the i-th element
    Copy = 120 => "COPY",
    /// Binary or in-place operator
    BinaryOp = 122 => "BINARY_OP",
    /// Send to a sub-generator
    Send = 123 => "SEND",
    /// Push a local variable
    LoadFast = 124 => "LOAD_FAST",
    /// Store top of stack into a local variable
    StoreFast = 125 => "STORE_FAST",
    /// `del local`
    DeleteFast = 126 => "DELETE_FAST",
    /// Pop and jump forward if not `None`
    PopJumpForwardIfNotNone = 128 => "POP_JUMP_FORWARD_IF_NOT_NONE",
    /// Pop and jump forward if `None`
    PopJumpForwardIfNone = 129 => "POP_JUMP_FORWARD_IF_NONE",
    /// `raise` with 0-2 arguments
    RaiseVarargs = 130 => "RAISE_VARARGS",
    /// Awaitable from top of stack
    GetAwaitable = 131 => "GET_AWAITABLE",
    /// Create a function object
    MakeFunction = 132 => "MAKE_FUNCTION",
    /// Build a slice object
    BuildSlice = 133 => "BUILD_SLICE",
    /// Backward jump without interrupt check
    JumpBackwardNoInterrupt = 134 => "JUMP_BACKWARD_NO_INTERRUPT",
    /// Create a cell for a local
    MakeCell = 135 => "MAKE_CELL",
    /// Push a closure cell
    LoadClosure = 136 => "LOAD_CLOSURE",
    /// Load the contents of a cell
    LoadDeref = 137 => "LOAD_DEREF",
    /// Store into a cell
    StoreDeref = 138 => "STORE_DEREF",
    /// Empty a cell
    DeleteDeref = 139 => "DELETE_DEREF",
    /// Relative backward jump (loop latch)
    JumpBackward = 140 => "JUMP_BACKWARD",
    /// Call with `*args` / `**kwargs`
    CallFunctionEx = 142 => "CALL_FUNCTION_EX",
    /// Prefix for wide arguments
    ExtendedArg = 144 => "EXTENDED_ARG",
    /// `list.append` for comprehensions
    ListAppend = 145 => "LIST_APPEND",
    /// `set.add` for comprehensions
    SetAdd = 146 => "SET_ADD",
    /// `dict.__setitem__` for comprehensions
    MapAdd = 147 => "MAP_ADD",
    /// Class-body free variable load
    LoadClassderef = 148 => "LOAD_CLASSDEREF",
    /// Copy free variables into the frame
    CopyFreeVars = 149 => "COPY_FREE_VARS",
    /// Frame entry / resumption marker
    Resume = 151 => "RESUME",
    /// Pattern matching: class pattern
    MatchClass = 152 => "MATCH_CLASS",
    /// f-string value formatting
    FormatValue = 155 => "FORMAT_VALUE",
    /// Build a dict with constant keys
    BuildConstKeyMap = 156 => "BUILD_CONST_KEY_MAP",
    /// Concatenate `count` strings
    BuildString = 157 => "BUILD_STRING",
    /// Load a method for the call protocol
    LoadMethod = 160 => "LOAD_METHOD",
    /// `list.extend`
    ListExtend = 162 => "LIST_EXTEND",
    /// `set.update`
    SetUpdate = 163 => "SET_UPDATE",
    /// `dict` merge for `**` unpacking
    DictMerge = 164 => "DICT_MERGE",
    /// `dict.update`
    DictUpdate = 165 => "DICT_UPDATE",
    /// Call preparation marker
    Precall = 166 => "PRECALL",
    /// Call with `argc` positional arguments
    Call = 171 => "CALL",
    /// Keyword names for the next call
    KwNames = 172 => "KW_NAMES",
    /// Pop and jump backward if not `None`
    PopJumpBackwardIfNotNone = 173 => "POP_JUMP_BACKWARD_IF_NOT_NONE",
    /// Pop and jump backward if `None`
    PopJumpBackwardIfNone = 174 => "POP_JUMP_BACKWARD_IF_NONE",
    /// Pop and jump backward if false
    PopJumpBackwardIfFalse = 175 => "POP_JUMP_BACKWARD_IF_FALSE",
    /// Pop and jump backward if true
    PopJumpBackwardIfTrue = 176 => "POP_JUMP_BACKWARD_IF_TRUE",
}

/// First opcode that takes an argument
pub const HAVE_ARGUMENT: u8 = 90;

static BY_NAME: LazyLock<FxHashMap<&'static str, Opcode>> =
    LazyLock::new(|| Opcode::ALL.iter().map(|op| (op.name(), *op)).collect());

impl Opcode {
    /// Look up an opcode by its `dis` name
    pub fn from_name(name: &str) -> Result<Self> {
        BY_NAME
            .get(name)
            .copied()
            .ok_or_else(|| BytecodeError::UnknownOpcode(name.to_string()))
    }

    /// Decode from raw byte, reporting unknown values
    pub fn try_from_byte(byte: u8) -> Result<Self> {
        Self::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether the opcode carries an argument
    #[inline]
    pub fn has_argument(self) -> bool {
        self.to_byte() >= HAVE_ARGUMENT
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Opcode {
    type Err = BytecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Decoders emit either the `dis` name or the raw opcode byte.
impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OpcodeVisitor;

        impl Visitor<'_> for OpcodeVisitor {
            type Value = Opcode;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an opcode name or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Opcode, E> {
                Opcode::from_name(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Opcode, E> {
                let byte = u8::try_from(v)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))?;
                Opcode::try_from_byte(byte).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(OpcodeVisitor)
    }
}

impl From<Opcode> for &'static str {
    fn from(op: Opcode) -> Self {
        op.name()
    }
}
