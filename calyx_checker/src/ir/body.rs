//! The body emitter: an append-only opcode sink over labeled basic blocks.
//!
//! The register counter and block cursor are shared state mutated only by
//! the checker, in evaluation order. When a declaration fails its check,
//! the emitter is disabled and the partial body is dropped by the driver;
//! no opcode-level rollback happens.

use std::collections::HashMap;

use super::core::{BasicBlock, BodyImpl, CompiledBody, Op, Register};

pub const ENTRY_BLOCK: &str = "entry";
pub const EXIT_BLOCK: &str = "exit";

#[derive(Debug)]
pub struct BodyEmitter {
    reg_counter: u32,
    block_counter: usize,
    blocks: Vec<BasicBlock>,
    index: HashMap<String, usize>,
    active: usize,
    enabled: bool,
    vars: Vec<(String, Register)>,
}

impl BodyEmitter {
    /// A fresh emitter with `entry` active and `exit` pre-created.
    pub fn new() -> Self {
        let mut emitter = Self {
            reg_counter: 0,
            block_counter: 0,
            blocks: Vec::new(),
            index: HashMap::new(),
            active: 0,
            enabled: true,
            vars: Vec::new(),
        };
        emitter.insert_block(ENTRY_BLOCK.to_string());
        emitter.insert_block(EXIT_BLOCK.to_string());
        emitter.active = 0;
        emitter
    }

    fn insert_block(&mut self, label: String) -> String {
        self.index.insert(label.clone(), self.blocks.len());
        self.blocks.push(BasicBlock::new(label.clone()));
        label
    }

    /// Disable emission; subsequent emits are ignored. Used when a type
    /// error makes the rest of the declaration's output meaningless.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn generate_tmp_register(&mut self) -> Register {
        let reg = Register(self.reg_counter);
        self.reg_counter += 1;
        reg
    }

    /// Record a frame variable and allocate its home register. Idempotent;
    /// registration order is preserved in the compiled body.
    pub fn register_var(&mut self, name: &str) -> Register {
        if let Some((_, reg)) = self.vars.iter().find(|(v, _)| v == name) {
            return *reg;
        }
        let reg = self.generate_tmp_register();
        self.vars.push((name.to_string(), reg));
        reg
    }

    /// The home register of a registered frame variable.
    pub fn var_register(&self, name: &str) -> Option<Register> {
        self.vars
            .iter()
            .find(|(v, _)| v == name)
            .map(|(_, reg)| *reg)
    }

    /// Create a new block with a uniquified label and return the label.
    /// Blocks are created in lexical order of the constructs needing them.
    pub fn create_new_block(&mut self, label: &str) -> String {
        self.block_counter += 1;
        let label = format!("{}_{}", label, self.block_counter);
        self.insert_block(label)
    }

    pub fn set_active_block(&mut self, label: &str) {
        if let Some(&idx) = self.index.get(label) {
            self.active = idx;
        }
    }

    pub fn active_block(&self) -> &str {
        &self.blocks[self.active].label
    }

    /// Append an opcode to the active block. No-op when disabled.
    pub fn emit(&mut self, op: Op) {
        if self.enabled {
            self.blocks[self.active].ops.push(op);
        }
    }

    /// Emit a direct jump and move the cursor to the target.
    pub fn emit_direct_jump(&mut self, target: &str) {
        self.emit(Op::DirectJump {
            target: target.to_string(),
        });
        self.set_active_block(target);
    }

    pub fn emit_bool_jump(&mut self, cond: Register, true_target: &str, false_target: &str) {
        self.emit(Op::BoolJump {
            cond,
            true_target: true_target.to_string(),
            false_target: false_target.to_string(),
        });
    }

    pub fn emit_none_jump(&mut self, arg: Register, none_target: &str, some_target: &str) {
        self.emit(Op::NoneJump {
            arg,
            none_target: none_target.to_string(),
            some_target: some_target.to_string(),
        });
    }

    /// Finish the body. The exit block is moved to the end so block order
    /// is entry, interior blocks in creation order, exit.
    pub fn get_body(self, bkey: &str, src_file: &str) -> CompiledBody {
        let mut blocks = self.blocks;
        let exit = blocks.remove(1);
        blocks.push(exit);
        CompiledBody {
            bkey: bkey.to_string(),
            src_file: src_file.to_string(),
            body: BodyImpl::Blocks {
                register_count: self.reg_counter,
                vars: self.vars,
                blocks,
            },
        }
    }
}

impl Default for BodyEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_registers_are_sequential() {
        let mut emitter = BodyEmitter::new();
        assert_eq!(emitter.generate_tmp_register(), Register(0));
        assert_eq!(emitter.generate_tmp_register(), Register(1));
    }

    #[test]
    fn test_block_labels_are_uniquified_in_order() {
        let mut emitter = BodyEmitter::new();
        assert_eq!(emitter.create_new_block("then"), "then_1");
        assert_eq!(emitter.create_new_block("then"), "then_2");
    }

    #[test]
    fn test_disabled_emitter_ignores_ops() {
        let mut emitter = BodyEmitter::new();
        emitter.disable();
        emitter.emit(Op::LoadConstNone { trgt: Register(0) });
        let body = emitter.get_body("k", "f.cx");
        match body.body {
            BodyImpl::Blocks { blocks, .. } => {
                assert!(blocks.iter().all(|b| b.ops.is_empty()));
            }
            BodyImpl::Raw { .. } => panic!("expected blocks"),
        }
    }

    #[test]
    fn test_exit_block_is_last() {
        let mut emitter = BodyEmitter::new();
        emitter.create_new_block("then");
        let body = emitter.get_body("k", "f.cx");
        match body.body {
            BodyImpl::Blocks { blocks, .. } => {
                assert_eq!(blocks.first().unwrap().label, ENTRY_BLOCK);
                assert_eq!(blocks.last().unwrap().label, EXIT_BLOCK);
            }
            BodyImpl::Raw { .. } => panic!("expected blocks"),
        }
    }
}
