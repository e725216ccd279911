//! 指令记录与 ISA 枚举定义
//!
//! 本文件只定义共享词汇表，不含任何行为：
//! - `Opcode`: 指令字低 7 位选出的大类
//! - `InstrFormat`: 立即数编码格式
//! - `Mnemonic`: 完全消歧后的助记符
//! - `Instr`: 解码产物，每次 `step` 产生一个，无持久身份

/// Opcode 大类（指令字 `[6:0]`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// R-type 寄存器-寄存器算术（'op'）
    ArithR,
    /// I-type 访存加载
    Load,
    /// I-type 栅栏（'misc-mem'）
    Fence,
    /// I-type 立即数算术（'op-imm'）
    ArithI,
    /// I-type 间接跳转
    Jalr,
    /// I-type 系统指令（ecall/ebreak/CSR）
    System,
    /// S-type 访存存储
    Store,
    /// B-type 条件分支
    Branch,
    /// U-type PC 相对上位立即数
    Auipc,
    /// U-type 上位立即数装载
    Lui,
    /// J-type 直接跳转
    Jal,
}

impl Opcode {
    /// 从指令字低 7 位解析 opcode 大类；未知编码返回 `None`
    pub fn from_bits(bits: u32) -> Option<Opcode> {
        match bits {
            0b0110011 => Some(Opcode::ArithR),
            0b0000011 => Some(Opcode::Load),
            0b0001111 => Some(Opcode::Fence),
            0b0010011 => Some(Opcode::ArithI),
            0b1100111 => Some(Opcode::Jalr),
            0b1110011 => Some(Opcode::System),
            0b0100011 => Some(Opcode::Store),
            0b1100011 => Some(Opcode::Branch),
            0b0010111 => Some(Opcode::Auipc),
            0b0110111 => Some(Opcode::Lui),
            0b1101111 => Some(Opcode::Jal),
            _ => None,
        }
    }
}

/// 立即数编码格式
///
/// 决定立即数（如果有）如何从指令字中重组与符号扩展。
/// R-type 与非法编码不携带立即数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrFormat {
    /// 寄存器-寄存器，无立即数
    Reg,
    /// I-type 12-bit 立即数（load/fence/arith-i/jalr/system 共用）
    Imm,
    /// S-type 立即数，分裂在两个位段
    Store,
    /// B-type 立即数，三个位段加符号位
    Branch,
    /// U-type 立即数，占据高 20 位
    Upper,
    /// J-type 立即数，三个位段加符号位
    Jump,
    /// 非法编码
    Illegal,
}

impl InstrFormat {
    /// 格式名称，用于错误诊断
    pub fn name(self) -> &'static str {
        match self {
            InstrFormat::Reg => "reg",
            InstrFormat::Imm => "imm",
            InstrFormat::Store => "store",
            InstrFormat::Branch => "branch",
            InstrFormat::Upper => "upper",
            InstrFormat::Jump => "jump",
            InstrFormat::Illegal => "illegal",
        }
    }
}

/// 助记符
///
/// 相邻无空行的分组（如 Add/Sub）共享 funct3，靠 funct7 或
/// 整字精确匹配消歧。`Illegal` 是非法编码的哨兵值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    // ========== R-type ==========
    Add, Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl, Sra,
    Or,
    And,

    // ========== I-type: load ==========
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,

    // ========== I-type: fence ==========
    Fence,
    FenceI,

    // ========== I-type: arith-i ==========
    Addi,
    Slli,
    Slti,
    Sltiu,
    Xori,
    Srli, Srai,
    Ori,
    Andi,

    // ========== I-type: jalr ==========
    Jalr,

    // ========== I-type: system ==========
    Ecall, Ebreak,
    Csrrw,
    Csrrs,
    Csrrc,
    Csrrwi,
    Csrrsi,
    Csrrci,

    // ========== S-type ==========
    Sb,
    Sh,
    Sw,

    // ========== B-type ==========
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,

    // ========== U-type ==========
    Auipc,
    Lui,

    // ========== J-type ==========
    Jal,

    // ========== 其它 ==========
    Illegal,
}

/// 解码后的指令记录
///
/// 解码阶段一次性完成字段提取、助记符消歧与立即数符号扩展，
/// 执行阶段只读取本结构，不再接触原始编码。
///
/// 不变量：解码之后 `format` 与 `mnem` 总是已设置；
/// `imm` 只对携带立即数的格式有意义（Reg/Illegal 保持 0）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    /// 原始 32-bit 指令编码
    pub raw: u32,
    /// opcode 大类；未知编码为 `None`
    pub opcode: Option<Opcode>,
    /// funct3 字段 `[14:12]`，未消歧的原始值
    pub funct3: u32,
    /// funct7 字段 `[31:25]`，未消歧的原始值
    pub funct7: u32,
    /// 目的寄存器索引 `[11:7]`
    pub rd: u8,
    /// 源寄存器 1 索引 `[19:15]`
    pub rs1: u8,
    /// 源寄存器 2 索引 `[24:20]`
    pub rs2: u8,
    /// 按格式重组并符号扩展后的立即数（寄存器宽度位模式）
    pub imm: u32,
    /// 立即数编码格式
    pub format: InstrFormat,
    /// 完全消歧后的助记符
    pub mnem: Mnemonic,
}
