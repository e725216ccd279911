//! Execution dispatch for decoded RV32I instructions.
//!
//! 分派顺序与解码一致：先按 opcode 大类进入对应处理函数，
//! 再在函数内按助记符细分。每个处理函数中：
//! - `Mnemonic::Illegal` 报 `IllegalInstruction`（携带格式名）
//! - 其它不属于本大类的助记符报 `Internal`（解码器/执行器不一致）

use super::{Cpu, CpuError, StepOutcome, ecall};
use crate::isa::{INSTR_BYTES, Instr, Mnemonic, Opcode};

/// 执行一条已解码的指令并完成 PC 推进
pub(super) fn execute(cpu: &mut Cpu, instr: Instr) -> Result<StepOutcome, CpuError> {
    let mut outcome = StepOutcome::Continue;

    match instr.opcode {
        Some(Opcode::ArithR) => arith_r(cpu, instr)?,
        Some(Opcode::Load) => load(cpu, instr)?,
        Some(Opcode::Fence) => fence(instr)?,
        Some(Opcode::ArithI) => arith_i(cpu, instr)?,
        Some(Opcode::Jalr) => jalr(cpu, instr)?,
        Some(Opcode::System) => outcome = system(cpu, instr)?,
        Some(Opcode::Store) => store(cpu, instr)?,
        Some(Opcode::Branch) => branch(cpu, instr)?,
        Some(Opcode::Auipc) | Some(Opcode::Lui) => upper(cpu, instr)?,
        Some(Opcode::Jal) => jal(cpu, instr),
        None => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
    }

    // 跳转与分支在各自的处理函数里完成 PC 更新；
    // 其余指令（包括未跳转的分支之外的一切）推进一个指令宽度
    match instr.mnem {
        Mnemonic::Jal
        | Mnemonic::Jalr
        | Mnemonic::Beq
        | Mnemonic::Bne
        | Mnemonic::Blt
        | Mnemonic::Bge
        | Mnemonic::Bltu
        | Mnemonic::Bgeu => {}
        _ => cpu.pc = cpu.pc.wrapping_add(INSTR_BYTES),
    }

    Ok(outcome)
}

fn arith_r(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    let rs1 = cpu.regs.read(instr.rs1);
    let rs2 = cpu.regs.read(instr.rs2);

    let value = match instr.mnem {
        Mnemonic::Add => rs1.wrapping_add(rs2),
        Mnemonic::Sub => rs1.wrapping_sub(rs2),
        Mnemonic::Sll => rs1 << (rs2 & 0x1F),
        Mnemonic::Slt => ((rs1 as i32) < (rs2 as i32)) as u32,
        Mnemonic::Sltu => (rs1 < rs2) as u32,
        Mnemonic::Xor => rs1 ^ rs2,
        Mnemonic::Srl => rs1 >> (rs2 & 0x1F),
        Mnemonic::Sra => ((rs1 as i32) >> (rs2 & 0x1F)) as u32,
        Mnemonic::Or => rs1 | rs2,
        Mnemonic::And => rs1 & rs2,
        Mnemonic::Illegal => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
        _ => return Err(CpuError::Internal("non-reg mnemonic in arith_r")),
    };

    cpu.regs.write(instr.rd, value);
    Ok(())
}

fn arith_i(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    let rs1 = cpu.regs.read(instr.rs1);
    let imm = instr.imm;

    let value = match instr.mnem {
        Mnemonic::Addi => rs1.wrapping_add(imm),
        Mnemonic::Slli => rs1 << (imm & 0x1F),
        Mnemonic::Slti => ((rs1 as i32) < (imm as i32)) as u32,
        Mnemonic::Sltiu => (rs1 < imm) as u32,
        Mnemonic::Xori => rs1 ^ imm,
        Mnemonic::Srli => rs1 >> (imm & 0x1F),
        Mnemonic::Srai => ((rs1 as i32) >> (imm & 0x1F)) as u32,
        Mnemonic::Ori => rs1 | imm,
        Mnemonic::Andi => rs1 & imm,
        Mnemonic::Illegal => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
        _ => return Err(CpuError::Internal("non-imm mnemonic in arith_i")),
    };

    cpu.regs.write(instr.rd, value);
    Ok(())
}

fn load(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    let addr = cpu.regs.read(instr.rs1).wrapping_add(instr.imm);

    let value = match instr.mnem {
        // 有符号变体把读出的值符号扩展到寄存器宽度
        Mnemonic::Lb => cpu.mem.load8(addr)? as i8 as i32 as u32,
        Mnemonic::Lh => cpu.mem.load16(addr)? as i16 as i32 as u32,
        Mnemonic::Lw => cpu.mem.load32(addr)?,
        Mnemonic::Lbu => cpu.mem.load8(addr)? as u32,
        Mnemonic::Lhu => cpu.mem.load16(addr)? as u32,
        Mnemonic::Illegal => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
        _ => return Err(CpuError::Internal("non-load mnemonic in load")),
    };

    cpu.regs.write(instr.rd, value);
    Ok(())
}

fn store(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    let addr = cpu.regs.read(instr.rs1).wrapping_add(instr.imm);
    let rs2 = cpu.regs.read(instr.rs2);

    match instr.mnem {
        Mnemonic::Sb => cpu.mem.store8(addr, rs2 as u8)?,
        Mnemonic::Sh => cpu.mem.store16(addr, rs2 as u16)?,
        Mnemonic::Sw => cpu.mem.store32(addr, rs2)?,
        Mnemonic::Illegal => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
        _ => return Err(CpuError::Internal("non-store mnemonic in store")),
    }

    Ok(())
}

/// 单核、单一地址空间的仿真中没有可见的访存顺序需要维护
fn fence(instr: Instr) -> Result<(), CpuError> {
    match instr.mnem {
        Mnemonic::Fence | Mnemonic::FenceI => Ok(()),
        Mnemonic::Illegal => Err(CpuError::IllegalInstruction {
            format: instr.format.name(),
        }),
        _ => Err(CpuError::Internal("non-fence mnemonic in fence")),
    }
}

fn branch(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    let rs1 = cpu.regs.read(instr.rs1);
    let rs2 = cpu.regs.read(instr.rs2);

    let taken = match instr.mnem {
        Mnemonic::Beq => rs1 == rs2,
        Mnemonic::Bne => rs1 != rs2,
        Mnemonic::Blt => (rs1 as i32) < (rs2 as i32),
        Mnemonic::Bge => (rs1 as i32) >= (rs2 as i32),
        Mnemonic::Bltu => rs1 < rs2,
        Mnemonic::Bgeu => rs1 >= rs2,
        Mnemonic::Illegal => {
            return Err(CpuError::IllegalInstruction {
                format: instr.format.name(),
            });
        }
        _ => return Err(CpuError::Internal("non-branch mnemonic in branch")),
    };

    // 两条路径都在此终结本步的 PC 更新，绝不推进两次
    cpu.pc = if taken {
        cpu.pc.wrapping_add(instr.imm)
    } else {
        cpu.pc.wrapping_add(INSTR_BYTES)
    };

    Ok(())
}

fn jal(cpu: &mut Cpu, instr: Instr) {
    cpu.regs
        .write(instr.rd, cpu.pc.wrapping_add(INSTR_BYTES));
    cpu.pc = cpu.pc.wrapping_add(instr.imm);
}

fn jalr(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    match instr.mnem {
        Mnemonic::Jalr => {
            let target = cpu.regs.read(instr.rs1).wrapping_add(instr.imm) & !1;
            cpu.regs
                .write(instr.rd, cpu.pc.wrapping_add(INSTR_BYTES));
            cpu.pc = target;
            Ok(())
        }
        Mnemonic::Illegal => Err(CpuError::IllegalInstruction {
            format: instr.format.name(),
        }),
        _ => Err(CpuError::Internal("non-jalr mnemonic in jalr")),
    }
}

fn upper(cpu: &mut Cpu, instr: Instr) -> Result<(), CpuError> {
    // 立即数在解码时已移入高位
    let value = match instr.mnem {
        Mnemonic::Auipc => cpu.pc.wrapping_add(instr.imm),
        Mnemonic::Lui => instr.imm,
        _ => return Err(CpuError::Internal("non-upper mnemonic in upper")),
    };

    cpu.regs.write(instr.rd, value);
    Ok(())
}

fn system(cpu: &mut Cpu, instr: Instr) -> Result<StepOutcome, CpuError> {
    match instr.mnem {
        Mnemonic::Ecall => ecall::dispatch(cpu),
        // EBREAK 与 CSR 指令被承认但不执行
        Mnemonic::Ebreak
        | Mnemonic::Csrrw
        | Mnemonic::Csrrs
        | Mnemonic::Csrrc
        | Mnemonic::Csrrwi
        | Mnemonic::Csrrsi
        | Mnemonic::Csrrci => Ok(StepOutcome::Continue),
        Mnemonic::Illegal => Err(CpuError::IllegalInstruction {
            format: instr.format.name(),
        }),
        _ => Err(CpuError::Internal("non-system mnemonic in system")),
    }
}
