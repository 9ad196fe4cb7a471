//! The Garnet instruction set consumed by CFG construction.
//!
//! Instructions are a closed set of operation tags. A small group of tags
//! drives control flow (branch, jump, return, throw, indirect jump); label
//! and region markers are pseudo-instructions that never become block
//! contents; everything else is an ordinary straight-line instruction.

pub(crate) mod label;

pub use self::label::{Label, LabelAllocator, Variable};

use crate::cfg::{Cfg, CfgBuildError};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// Operation tag of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Label,
    Copy,
    Call,
    Branch,
    Jump,
    Return,
    Throw,
    JumpIndirect,
    SetReturnAddress,
    RegionStart,
    RegionEnd,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Label => "label",
            Opcode::Copy => "copy",
            Opcode::Call => "call",
            Opcode::Branch => "branch",
            Opcode::Jump => "jump",
            Opcode::Return => "return",
            Opcode::Throw => "throw",
            Opcode::JumpIndirect => "jump_indirect",
            Opcode::SetReturnAddress => "set_return_address",
            Opcode::RegionStart => "region_start",
            Opcode::RegionEnd => "region_end",
        };
        f.write_str(name)
    }
}

/// A value operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Var(Variable),
    Int(i64),
    Str(String),
    Nil,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Int(n) => write!(f, "{}", n),
            Operand::Str(s) => write!(f, "{:?}", s),
            Operand::Nil => f.write_str("nil"),
        }
    }
}

/// Shared handle to a closure operand.
pub type ScopeRef = Rc<ClosureScope>;

/// One instruction of the linear stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Defines `label` at the current stream position. Pseudo-instruction;
    /// never stored in a block.
    Label(Label),

    /// `dest = src`.
    Copy { dest: Variable, src: Operand },

    /// Method dispatch. Calls may raise and may carry a closure operand.
    Call {
        dest: Option<Variable>,
        method: String,
        args: SmallVec<[Operand; 4]>,
        closure: Option<ScopeRef>,
    },

    /// Conditional branch. The not-taken path falls through.
    Branch { cond: Operand, target: Label },

    /// Unconditional jump.
    Jump { target: Label },

    /// Return to the caller.
    Return { value: Option<Operand> },

    /// Raise `exception`.
    Throw { exception: Operand },

    /// Jump through the code address stored in `addr`.
    JumpIndirect { addr: Variable },

    /// Store the code address of `target` into `dest`.
    SetReturnAddress { dest: Variable, target: Label },

    /// Opens a protected region with the given handler entry labels.
    /// Pseudo-instruction; never stored in a block.
    RegionStart { rescue: Label, ensure: Option<Label> },

    /// Closes the innermost open protected region. Pseudo-instruction.
    RegionEnd,
}

impl Instr {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Label(_) => Opcode::Label,
            Instr::Copy { .. } => Opcode::Copy,
            Instr::Call { .. } => Opcode::Call,
            Instr::Branch { .. } => Opcode::Branch,
            Instr::Jump { .. } => Opcode::Jump,
            Instr::Return { .. } => Opcode::Return,
            Instr::Throw { .. } => Opcode::Throw,
            Instr::JumpIndirect { .. } => Opcode::JumpIndirect,
            Instr::SetReturnAddress { .. } => Opcode::SetReturnAddress,
            Instr::RegionStart { .. } => Opcode::RegionStart,
            Instr::RegionEnd => Opcode::RegionEnd,
        }
    }

    /// Whether this instruction seals the basic block it is stored in.
    pub fn ends_block(&self) -> bool {
        matches!(
            self.opcode(),
            Opcode::Branch | Opcode::Jump | Opcode::Return | Opcode::Throw | Opcode::JumpIndirect
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(self.opcode(), Opcode::Return)
    }

    /// Whether executing this instruction can raise an exception.
    pub fn can_raise(&self) -> bool {
        matches!(self.opcode(), Opcode::Call | Opcode::Throw)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label(label) => write!(f, "label {}", label),
            Instr::Copy { dest, src } => write!(f, "{} = {}", dest, src),
            Instr::Call {
                dest,
                method,
                args,
                closure,
            } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                write!(f, "call {}(", method)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")?;
                if closure.is_some() {
                    f.write_str(" &closure")?;
                }
                Ok(())
            }
            Instr::Branch { cond, target } => write!(f, "branch {}, {}", cond, target),
            Instr::Jump { target } => write!(f, "jump {}", target),
            Instr::Return { value: Some(value) } => write!(f, "return {}", value),
            Instr::Return { value: None } => f.write_str("return"),
            Instr::Throw { exception } => write!(f, "throw {}", exception),
            Instr::JumpIndirect { addr } => write!(f, "jump *{}", addr),
            Instr::SetReturnAddress { dest, target } => {
                write!(f, "{} = ret_addr {}", dest, target)
            }
            Instr::RegionStart {
                rescue,
                ensure: Some(ensure),
            } => write!(f, "region_start rescue={} ensure={}", rescue, ensure),
            Instr::RegionStart {
                rescue,
                ensure: None,
            } => write!(f, "region_start rescue={}", rescue),
            Instr::RegionEnd => f.write_str("region_end"),
        }
    }
}

/// A closure operand: a nested instruction stream owning its own CFG.
///
/// The CFG is built on first request by a synchronous recursive invocation of
/// the same construction algorithm and cached on the scope. The nested build
/// shares nothing with the build that triggered it except the label
/// allocator.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClosureScope {
    pub body: Vec<Instr>,
    #[serde(skip)]
    cfg: OnceCell<Cfg>,
}

impl ClosureScope {
    pub fn new(body: Vec<Instr>) -> ScopeRef {
        Rc::new(Self {
            body,
            cfg: OnceCell::new(),
        })
    }

    /// The closure's CFG, if it has been built.
    pub fn cfg(&self) -> Option<&Cfg> {
        self.cfg.get()
    }

    /// Builds the closure's own CFG (once) and returns it.
    pub fn build_cfg(&self, labels: &mut LabelAllocator) -> Result<&Cfg, CfgBuildError> {
        if let Some(cfg) = self.cfg.get() {
            return Ok(cfg);
        }
        let built = Cfg::build(self.body.clone(), labels)?;
        Ok(self.cfg.get_or_init(|| built))
    }
}

impl PartialEq for ClosureScope {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flow_properties_per_opcode() {
        let mut labels = LabelAllocator::new();
        let target = labels.fresh();

        let branch = Instr::Branch {
            cond: Operand::Var(Variable::new(0)),
            target,
        };
        let jump = Instr::Jump { target };
        let ret = Instr::Return { value: None };
        let throw = Instr::Throw {
            exception: Operand::Nil,
        };
        let indirect = Instr::JumpIndirect {
            addr: Variable::new(1),
        };
        for instr in [&branch, &jump, &ret, &throw, &indirect] {
            assert!(instr.ends_block(), "{} must end its block", instr);
        }

        let copy = Instr::Copy {
            dest: Variable::new(2),
            src: Operand::Int(1),
        };
        let set = Instr::SetReturnAddress {
            dest: Variable::new(3),
            target,
        };
        for instr in [&copy, &set, &Instr::Label(target), &Instr::RegionEnd] {
            assert!(!instr.ends_block(), "{} must not end its block", instr);
        }

        assert!(ret.is_return());
        assert!(!jump.is_return());
        assert!(throw.can_raise());
        assert!(!copy.can_raise());
        assert!(Instr::Call {
            dest: None,
            method: "to_s".to_string(),
            args: SmallVec::new(),
            closure: None,
        }
        .can_raise());
    }

    #[test]
    fn display_formats() {
        let mut labels = LabelAllocator::new();
        let target = labels.fresh();

        let copy = Instr::Copy {
            dest: Variable::new(1),
            src: Operand::Int(42),
        };
        assert_eq!(format!("{}", copy), "v1 = 42");

        let branch = Instr::Branch {
            cond: Operand::Var(Variable::new(1)),
            target,
        };
        assert_eq!(format!("{}", branch), "branch v1, L0");

        let set = Instr::SetReturnAddress {
            dest: Variable::new(9),
            target,
        };
        assert_eq!(format!("{}", set), "v9 = ret_addr L0");
    }

    #[test]
    fn closure_equality_ignores_cached_cfg() {
        let mut labels = LabelAllocator::new();
        let body = vec![Instr::Return { value: None }];
        let a = ClosureScope::new(body.clone());
        let b = ClosureScope::new(body);

        a.build_cfg(&mut labels).unwrap();
        assert!(a.cfg().is_some());
        assert!(b.cfg().is_none());
        assert_eq!(*a, *b);
    }
}
