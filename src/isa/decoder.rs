//! 指令解码器
//!
//! `decode` 把原始 32-bit 指令字翻译为结构化的 `Instr`。
//! 解码是全函数：任何输入都产生一个值，非法编码以
//! `Mnemonic::Illegal` / `InstrFormat::Illegal` 标记，从不拒绝。

use super::bits::{bit_extract, bit_mask};
use super::instr::{Instr, InstrFormat, Mnemonic, Opcode};
use super::{XLEN, fields};

/// 解码一条指令
///
/// # 流程
///
/// 1. 提取与 opcode 无关的固定字段（opcode/funct3/funct7/rd/rs1/rs2）
/// 2. 由 opcode 大类消歧助记符与格式，必要时继续按 funct3/funct7 区分
/// 3. 按格式重组立即数并符号扩展
///
/// # 示例
///
/// ```
/// use stride_sim::isa::{Mnemonic, decode};
///
/// let instr = decode(0x02A00093); // addi x1, x0, 42
/// assert_eq!(instr.mnem, Mnemonic::Addi);
/// assert_eq!(instr.imm, 42);
/// ```
pub fn decode(raw: u32) -> Instr {
    let mut instr = Instr {
        raw,
        opcode: Opcode::from_bits(fields::opcode_bits(raw)),
        funct3: fields::funct3(raw),
        funct7: fields::funct7(raw),
        rd: fields::rd(raw),
        rs1: fields::rs1(raw),
        rs2: fields::rs2(raw),
        imm: 0,
        format: InstrFormat::Illegal,
        mnem: Mnemonic::Illegal,
    };

    // 调用顺序重要：立即数的重组方式取决于已消歧的格式
    decode_mnem(&mut instr);
    decode_imm(&mut instr);

    instr
}

/// 设置 `instr.{mnem, format}`
fn decode_mnem(instr: &mut Instr) {
    let Some(opcode) = instr.opcode else {
        instr.format = InstrFormat::Illegal;
        instr.mnem = Mnemonic::Illegal;
        return;
    };

    let (format, mnem) = match opcode {
        // reg
        Opcode::ArithR => (InstrFormat::Reg, mnem_arith_r(instr.funct3, instr.funct7)),
        // imm
        Opcode::Load => (InstrFormat::Imm, mnem_load(instr.funct3)),
        Opcode::Fence => (InstrFormat::Imm, mnem_fence(instr.raw, instr.funct3)),
        Opcode::ArithI => (InstrFormat::Imm, mnem_arith_i(instr.funct3, instr.funct7)),
        Opcode::Jalr => (InstrFormat::Imm, mnem_jalr(instr.funct3)),
        Opcode::System => (InstrFormat::Imm, mnem_system(instr.raw, instr.funct3)),
        // store
        Opcode::Store => (InstrFormat::Store, mnem_store(instr.funct3)),
        // branch
        Opcode::Branch => (InstrFormat::Branch, mnem_branch(instr.funct3)),
        // upper
        Opcode::Auipc => (InstrFormat::Upper, Mnemonic::Auipc),
        Opcode::Lui => (InstrFormat::Upper, Mnemonic::Lui),
        // jump
        Opcode::Jal => (InstrFormat::Jump, Mnemonic::Jal),
    };

    instr.format = format;
    instr.mnem = mnem;
}

fn mnem_arith_r(funct3: u32, funct7: u32) -> Mnemonic {
    match funct3 {
        0b000 => match funct7 {
            0b0000000 => Mnemonic::Add,
            0b0100000 => Mnemonic::Sub,
            _ => Mnemonic::Illegal,
        },
        0b001 => Mnemonic::Sll,
        0b010 => Mnemonic::Slt,
        0b011 => Mnemonic::Sltu,
        0b100 => Mnemonic::Xor,
        0b101 => match funct7 {
            0b0000000 => Mnemonic::Srl,
            0b0100000 => Mnemonic::Sra,
            _ => Mnemonic::Illegal,
        },
        0b110 => Mnemonic::Or,
        0b111 => Mnemonic::And,
        _ => Mnemonic::Illegal,
    }
}

fn mnem_load(funct3: u32) -> Mnemonic {
    match funct3 {
        0b000 => Mnemonic::Lb,
        0b001 => Mnemonic::Lh,
        0b010 => Mnemonic::Lw,
        0b100 => Mnemonic::Lbu,
        0b101 => Mnemonic::Lhu,
        _ => Mnemonic::Illegal,
    }
}

/// FENCE/FENCE.I 只承认两个精确位模式，其余编码一律非法
fn mnem_fence(raw: u32, funct3: u32) -> Mnemonic {
    match funct3 {
        // FENCE: pred/succ 字段 [27:20] 任意，其余位必须为基准模式
        0b000 if raw & !bit_mask(27, 20) == 0x0000_000F => Mnemonic::Fence,
        0b001 if raw == 0x0000_100F => Mnemonic::FenceI,
        _ => Mnemonic::Illegal,
    }
}

fn mnem_arith_i(funct3: u32, funct7: u32) -> Mnemonic {
    match funct3 {
        0b000 => Mnemonic::Addi,
        0b001 => Mnemonic::Slli,
        0b010 => Mnemonic::Slti,
        0b011 => Mnemonic::Sltiu,
        0b100 => Mnemonic::Xori,
        0b101 => match funct7 {
            0b0000000 => Mnemonic::Srli,
            0b0100000 => Mnemonic::Srai,
            _ => Mnemonic::Illegal,
        },
        0b110 => Mnemonic::Ori,
        0b111 => Mnemonic::Andi,
        _ => Mnemonic::Illegal,
    }
}

fn mnem_jalr(funct3: u32) -> Mnemonic {
    match funct3 {
        0b000 => Mnemonic::Jalr,
        _ => Mnemonic::Illegal,
    }
}

/// ECALL/EBREAK 只承认两个精确整字模式；
/// 其余 funct3 映射到 CSR 助记符（接受但不执行）
fn mnem_system(raw: u32, funct3: u32) -> Mnemonic {
    match funct3 {
        0b000 => match raw {
            0x0000_0073 => Mnemonic::Ecall,
            0x0010_0073 => Mnemonic::Ebreak,
            _ => Mnemonic::Illegal,
        },
        0b001 => Mnemonic::Csrrw,
        0b010 => Mnemonic::Csrrs,
        0b011 => Mnemonic::Csrrc,
        0b101 => Mnemonic::Csrrwi,
        0b110 => Mnemonic::Csrrsi,
        0b111 => Mnemonic::Csrrci,
        _ => Mnemonic::Illegal,
    }
}

fn mnem_store(funct3: u32) -> Mnemonic {
    match funct3 {
        0b000 => Mnemonic::Sb,
        0b001 => Mnemonic::Sh,
        0b010 => Mnemonic::Sw,
        _ => Mnemonic::Illegal,
    }
}

fn mnem_branch(funct3: u32) -> Mnemonic {
    match funct3 {
        0b000 => Mnemonic::Beq,
        0b001 => Mnemonic::Bne,
        0b100 => Mnemonic::Blt,
        0b101 => Mnemonic::Bge,
        0b110 => Mnemonic::Bltu,
        0b111 => Mnemonic::Bgeu,
        _ => Mnemonic::Illegal,
    }
}

/// 设置 `instr.imm`：按格式重组位段并符号扩展
fn decode_imm(instr: &mut Instr) {
    let raw = instr.raw;

    instr.imm = match instr.format {
        // imm[11:0] = raw[31:20]; imm[31:11] = raw[31]
        InstrFormat::Imm => sign_extend(bit_extract(raw, 30, 20), raw, 11),
        // imm[4:0] = raw[11:7], imm[11:5] = raw[31:25]; imm[31:11] = raw[31]
        InstrFormat::Store => sign_extend(
            bit_extract(raw, 11, 7) | bit_extract(raw, 30, 25) << 5,
            raw,
            11,
        ),
        // imm[4:1] = raw[11:8], imm[10:5] = raw[30:25], imm[11] = raw[7];
        // imm[31:12] = raw[31]
        InstrFormat::Branch => sign_extend(
            bit_extract(raw, 11, 8) << 1
                | bit_extract(raw, 30, 25) << 5
                | bit_extract(raw, 7, 7) << 11,
            raw,
            12,
        ),
        // imm[10:1] = raw[30:21], imm[11] = raw[20], imm[19:12] = raw[19:12];
        // imm[31:20] = raw[31]
        InstrFormat::Jump => sign_extend(
            bit_extract(raw, 30, 21) << 1
                | bit_extract(raw, 20, 20) << 11
                | bit_extract(raw, 19, 12) << 12,
            raw,
            20,
        ),
        // imm[31:12] = raw[31:12]; 符号位即 imm 自身的 bit 31
        InstrFormat::Upper => bit_extract(raw, 31, 12) << 12,
        // 无立即数
        InstrFormat::Reg | InstrFormat::Illegal => 0,
    };
}

/// 以 `raw` 的 bit 31 为符号源，把 `imm[31:sign_bit]` 填成符号位
fn sign_extend(imm: u32, raw: u32, sign_bit: u32) -> u32 {
    match bit_extract(raw, 31, 31) {
        0 => imm & !bit_mask(XLEN - 1, sign_bit),
        _ => imm | bit_mask(XLEN - 1, sign_bit),
    }
}
