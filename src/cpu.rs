//! CPU 核心与执行引擎
//!
//! 本模块定义单线程 RV32I CPU 核心 `Cpu`，
//! 包含寄存器文件、程序计数器，并独占持有一块 `Memory`。
//! `step` 执行恰好一个 取指 → 解码 → 执行 → PC 推进 周期。

use std::fmt;

use crate::isa;
use crate::memory::{MemError, Memory};

pub mod ecall;
mod exec;
mod regfile;

pub use ecall::HostIo;
use regfile::RegFile;

/// 默认入口地址；必须与镜像中 `_start` 的地址一致
pub const ENTRY_POINT_ADDR: u32 = 0x0;

/// 默认栈顶地址（1 MiB）；可被 `_start` 覆盖
pub const STACK_START_ADDR: u32 = 0x10_0000;

/// 单步执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 指令正常退休，可以继续执行
    Continue,
    /// 客户程序通过 ecall 请求退出，携带退出状态
    Exit(u32),
}

/// 执行期错误
///
/// 所有变体都是致命的：核心内部从不恢复或重试，
/// 错误原样上抛给宿主驱动，失败的 `step` 不回滚已发生的状态变更。
#[derive(Debug)]
pub enum CpuError {
    /// 解码得到非法哨兵后进入执行分派，携带所在格式名
    IllegalInstruction { format: &'static str },
    /// 访存越界
    Memory(MemError),
    /// 标准输入流读取失败
    Input(String),
    /// ecall 选择子无法识别
    UnsupportedSyscall { code: u32 },
    /// 解码器与执行器不一致（防御性，正常情况不可达）
    Internal(&'static str),
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::IllegalInstruction { format } => {
                write!(f, "Illegal {} instruction", format)
            }
            CpuError::Memory(e) => write!(f, "Memory error: {}", e),
            CpuError::Input(s) => write!(f, "Input error: {}", s),
            CpuError::UnsupportedSyscall { code } => {
                write!(f, "No matching ecall: {:#x}", code)
            }
            CpuError::Internal(what) => write!(f, "Internal dispatch error: {}", what),
        }
    }
}

impl std::error::Error for CpuError {}

impl From<MemError> for CpuError {
    fn from(e: MemError) -> Self {
        CpuError::Memory(e)
    }
}

/// 单线程 CPU 核心
///
/// 包含 RV32I 的最小架构状态：
/// - 32 个 32-bit 通用寄存器 x0..x31（x0 恒为 0）
/// - 32-bit 程序计数器
/// - 独占持有的平坦内存（与核心同生命周期）
///
/// 设计约定：
/// - x0 的不变量由写入端保证，任何写入被丢弃
/// - 栈指针只是 x2 的命名别名，不是独立的存储位置
/// - 宿主标准流经 `HostIo` 注入，便于测试替换
///
/// # 示例
///
/// ```
/// use stride_sim::cpu::Cpu;
/// use stride_sim::memory::Memory;
///
/// let mut mem = Memory::new(1024);
/// mem.store32(0, 0x02A00093).unwrap(); // addi x1, x0, 42
///
/// let mut cpu = Cpu::new(mem);
/// cpu.step().unwrap();
/// assert_eq!(cpu.read_reg(1), 42);
/// ```
pub struct Cpu {
    /// 寄存器文件
    regs: RegFile,
    /// 程序计数器
    pc: u32,
    /// 平坦内存，由核心独占
    mem: Memory,
    /// 宿主标准流
    io: HostIo,
}

impl Cpu {
    /// 用默认入口 PC 与栈顶地址创建 CPU 核心
    pub fn new(mem: Memory) -> Self {
        Self::with_layout(mem, ENTRY_POINT_ADDR, STACK_START_ADDR)
    }

    /// 用指定入口 PC 与栈顶地址创建 CPU 核心
    pub fn with_layout(mem: Memory, entry_pc: u32, sp: u32) -> Self {
        let mut regs = RegFile::new();
        regs.write(isa::reg::SP, sp);
        Cpu {
            regs,
            pc: entry_pc,
            mem,
            io: HostIo::stdio(),
        }
    }

    /// 注入自定义宿主流（测试用）
    pub fn with_io(mem: Memory, entry_pc: u32, sp: u32, io: HostIo) -> Self {
        let mut cpu = Self::with_layout(mem, entry_pc, sp);
        cpu.io = io;
        cpu
    }

    /// 获取当前程序计数器值
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// 设置程序计数器
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// 读取寄存器；读取 x0 总是返回 0
    pub fn read_reg(&self, reg: u8) -> u32 {
        self.regs.read(reg)
    }

    /// 写入寄存器；对 x0 的写入被静默丢弃
    pub fn write_reg(&mut self, reg: u8, value: u32) {
        self.regs.write(reg, value)
    }

    /// 读取栈指针（x2 的别名）
    pub fn sp(&self) -> u32 {
        self.regs.read(isa::reg::SP)
    }

    /// 设置栈指针（x2 的别名）
    pub fn set_sp(&mut self, value: u32) {
        self.regs.write(isa::reg::SP, value)
    }

    /// 获取所有寄存器的快照
    pub fn regs(&self) -> &[u32; isa::REG_COUNT] {
        self.regs.snapshot()
    }

    /// 整体替换寄存器文件；x0 重新固定为 0
    pub fn set_regs(&mut self, regs: [u32; isa::REG_COUNT]) {
        self.regs.load_snapshot(regs)
    }

    /// 获取内存引用
    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// 获取内存可变引用
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// 执行单步指令
    ///
    /// # 流程
    ///
    /// 1. 从 PC 处取指
    /// 2. 解码指令
    /// 3. 按格式分派执行（可能读写内存、寄存器，可能做宿主 I/O）
    /// 4. 非跳转/分支指令 PC += 4
    ///
    /// # 返回
    ///
    /// `StepOutcome::Exit` 表示客户程序请求退出；
    /// 错误沿 `Result` 上抛，已发生的状态变更不回滚。
    pub fn step(&mut self) -> Result<StepOutcome, CpuError> {
        let word = self.mem.load32(self.pc)?;
        let instr = isa::decode(word);
        log::trace!("pc={:#010x} raw={:#010x} {:?}", self.pc, word, instr.mnem);
        exec::execute(self, instr)
    }

    /// 运行至多 `max_steps` 条指令
    ///
    /// # 返回
    ///
    /// 实际执行的指令数与最后一次 `step` 的结果。
    ///
    /// # 停止条件
    ///
    /// - 达到最大指令数
    /// - 客户程序请求退出
    /// - 出错（错误上抛）
    pub fn run(&mut self, max_steps: u64) -> Result<(u64, StepOutcome), CpuError> {
        let mut executed = 0;
        for _ in 0..max_steps {
            let outcome = self.step()?;
            executed += 1;
            if let StepOutcome::Exit(_) = outcome {
                return Ok((executed, outcome));
            }
        }
        Ok((executed, StepOutcome::Continue))
    }
}
