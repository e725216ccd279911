//! 仿真环境初始化模块
//!
//! 本模块负责：
//! - 读取并解析仿真配置
//! - 把内存镜像（原始字节或 RISC-V ELF）装入地址空间
//! - 初始化 CPU
//! - 驱动运行并汇总最终状态报告
//!
//! # 示例
//!
//! ```no_run
//! use stride_sim::sim_env::{SimConfig, SimEnv};
//!
//! let config = SimConfig::new()
//!     .with_img_path("mem.img")
//!     .with_max_steps(1000);
//!
//! let mut env = SimEnv::from_config(config).expect("Failed to create sim env");
//! let report = env.run_until_exit().expect("run failed");
//! println!("{}", report);
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use elf::ElfBytes;
use elf::abi::{EM_RISCV, PT_LOAD};
use elf::endian::AnyEndian;
use log::{debug, info};

use crate::cpu::{Cpu, CpuError, ENTRY_POINT_ADDR, STACK_START_ADDR, StepOutcome};
use crate::memory::{MemError, Memory};

/// 默认内存镜像路径
pub const DEFAULT_IMG_PATH: &str = "mem.img";

/// 仿真环境错误
#[derive(Debug)]
pub enum SimError {
    /// IO 错误
    Io(io::Error),
    /// ELF 解析错误
    ElfParse(String),
    /// 内存装载错误
    Memory(String),
    /// CPU 执行错误
    Cpu(CpuError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Io(e) => write!(f, "IO error: {}", e),
            SimError::ElfParse(s) => write!(f, "ELF parse error: {}", s),
            SimError::Memory(s) => write!(f, "Memory error: {}", s),
            SimError::Cpu(e) => write!(f, "CPU error: {}", e),
        }
    }
}

impl std::error::Error for SimError {}

impl From<io::Error> for SimError {
    fn from(e: io::Error) -> Self {
        SimError::Io(e)
    }
}

impl From<MemError> for SimError {
    fn from(e: MemError) -> Self {
        SimError::Memory(e.to_string())
    }
}

impl From<CpuError> for SimError {
    fn from(e: CpuError) -> Self {
        SimError::Cpu(e)
    }
}

/// 仿真配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 原始内存镜像路径（字节原样进入地址空间）
    pub img_path: Option<String>,
    /// ELF 文件路径（可选，优先于原始镜像）
    pub elf_path: Option<String>,
    /// 入口 PC；不指定时取镜像默认（原始镜像为 0，ELF 取入口点）
    pub entry_pc: Option<u32>,
    /// 栈顶地址；不指定时取默认值
    pub stack_pointer: Option<u32>,
    /// 装载 ELF 时的最小内存大小（原始镜像的大小即文件大小）
    pub memory_size: usize,
    /// 最大执行步数（0 表示无限制）
    pub max_steps: u64,
    /// 是否打印装载细节
    pub verbose: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            img_path: None,
            elf_path: None,
            entry_pc: None,
            stack_pointer: None,
            memory_size: STACK_START_ADDR as usize, // 1 MiB，覆盖默认栈
            max_steps: 0,
            verbose: false,
        }
    }
}

impl SimConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置原始镜像路径
    pub fn with_img_path(mut self, path: impl Into<String>) -> Self {
        self.img_path = Some(path.into());
        self
    }

    /// 设置 ELF 文件路径
    pub fn with_elf_path(mut self, path: impl Into<String>) -> Self {
        self.elf_path = Some(path.into());
        self
    }

    /// 设置入口 PC
    pub fn with_entry_pc(mut self, pc: u32) -> Self {
        self.entry_pc = Some(pc);
        self
    }

    /// 设置栈顶地址
    pub fn with_stack_pointer(mut self, sp: u32) -> Self {
        self.stack_pointer = Some(sp);
        self
    }

    /// 设置 ELF 装载时的最小内存大小
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    /// 设置最大执行步数
    pub fn with_max_steps(mut self, max: u64) -> Self {
        self.max_steps = max;
        self
    }

    /// 启用详细输出
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// ELF 程序段信息
#[derive(Debug, Clone)]
pub struct ElfSegment {
    /// 虚拟地址
    pub vaddr: u32,
    /// 内存中的大小（可能大于文件内容，差值为 bss）
    pub mem_size: usize,
    /// 段数据
    pub data: Vec<u8>,
}

/// ELF 文件解析结果
#[derive(Debug, Clone)]
pub struct ElfImage {
    /// 入口点地址
    pub entry: u32,
    /// 可装载程序段
    pub segments: Vec<ElfSegment>,
}

impl ElfImage {
    /// 解析 ELF 文件
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let data = fs::read(path.as_ref())?;
        Self::parse_bytes(&data)
    }

    /// 从字节数组解析 ELF（使用 elf crate）
    pub fn parse_bytes(data: &[u8]) -> Result<Self, SimError> {
        let elf_file = ElfBytes::<AnyEndian>::minimal_parse(data)
            .map_err(|e| SimError::ElfParse(format!("Failed to parse ELF: {}", e)))?;

        let header = &elf_file.ehdr;

        if header.e_machine != EM_RISCV {
            return Err(SimError::ElfParse(format!(
                "Not a RISC-V ELF (machine type: {:#x}, expected {:#x})",
                header.e_machine, EM_RISCV
            )));
        }

        if header.class != elf::file::Class::ELF32 {
            return Err(SimError::ElfParse("Only 32-bit ELF is supported".into()));
        }

        let entry = header.e_entry as u32;

        // 只收集 PT_LOAD 段
        let mut segments = Vec::new();
        if let Some(phdrs) = elf_file.segments() {
            for phdr in phdrs {
                if phdr.p_type != PT_LOAD {
                    continue;
                }

                let data = elf_file
                    .segment_data(&phdr)
                    .map_err(|e| {
                        SimError::ElfParse(format!("Failed to read segment data: {}", e))
                    })?
                    .to_vec();

                segments.push(ElfSegment {
                    vaddr: phdr.p_vaddr as u32,
                    mem_size: phdr.p_memsz as usize,
                    data,
                });
            }
        }

        Ok(ElfImage { entry, segments })
    }

    /// 所有可装载段的结束地址（0 表示没有可装载段）
    pub fn address_end(&self) -> u32 {
        self.segments
            .iter()
            .map(|s| s.vaddr.saturating_add(s.mem_size as u32))
            .max()
            .unwrap_or(0)
    }
}

/// 把 ELF 段装入内存；内存创建时已清零，bss 不需要额外填充
fn load_elf_segments(memory: &mut Memory, image: &ElfImage) -> Result<(), SimError> {
    for seg in &image.segments {
        if seg.mem_size == 0 {
            continue;
        }
        memory.write_bytes(seg.vaddr, &seg.data)?;
        debug!(
            "loaded segment: vaddr={:#010x} filesz={:#x} memsz={:#x}",
            seg.vaddr,
            seg.data.len(),
            seg.mem_size
        );
    }
    Ok(())
}

/// 运行结束报告
///
/// 驱动局部状态的汇总，由宿主在运行结束后打印；
/// 核心内部不保存任何全局可变状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// 已执行的步数
    pub steps: u64,
    /// 最终 PC
    pub pc: u32,
    /// 最终 SP
    pub sp: u32,
    /// 客户程序的退出状态；`None` 表示到达步数上限仍未退出
    pub exit_status: Option<u32>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "final step count: {}", self.steps)?;
        writeln!(f, "final pc: {:#x}", self.pc)?;
        write!(f, "final sp: {:#x}", self.sp)
    }
}

/// 仿真环境
///
/// 封装 CPU 与配置，提供统一的装载与驱动接口
pub struct SimEnv {
    /// CPU 核心（独占持有内存）
    pub cpu: Cpu,
    /// 配置
    pub config: SimConfig,
    /// 已执行的步数
    pub steps_executed: u64,
}

impl SimEnv {
    /// 从配置创建仿真环境
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        // 1. 装载镜像，得到内存与镜像默认入口
        let (memory, image_entry) = if let Some(ref elf_path) = config.elf_path {
            let image = ElfImage::parse(elf_path)?;

            // 地址空间至少容纳所有段，按 4 KiB 对齐
            let end = image.address_end() as usize;
            let size = config.memory_size.max((end + 0xFFF) & !0xFFF);
            let mut memory = Memory::new(size);
            load_elf_segments(&mut memory, &image)?;

            if config.verbose {
                println!("Loaded ELF: {}", elf_path);
                println!("  Entry point: {:#010x}", image.entry);
                println!("  Segments: {}", image.segments.len());
                println!("  Memory size: {:#x}", size);
            }
            info!("loaded ELF {} ({} segments)", elf_path, image.segments.len());

            (memory, image.entry)
        } else {
            // 原始镜像：文件字节原样成为整个地址空间
            let path = config.img_path.as_deref().unwrap_or(DEFAULT_IMG_PATH);
            let data = fs::read(path)?;

            if config.verbose {
                println!("Loaded image: {}", path);
                println!("  Size: {} bytes", data.len());
            }
            info!("loaded raw image {} ({} bytes)", path, data.len());

            (Memory::from_image(data), ENTRY_POINT_ADDR)
        };

        // 2. 入口 PC 与栈顶：配置覆盖优先于镜像默认
        let entry_pc = config.entry_pc.unwrap_or(image_entry);
        let sp = config.stack_pointer.unwrap_or(STACK_START_ADDR);

        // 3. 创建 CPU
        let cpu = Cpu::with_layout(memory, entry_pc, sp);
        if config.verbose {
            println!("CPU initialized at PC={:#010x}, SP={:#010x}", entry_pc, sp);
        }

        Ok(SimEnv {
            cpu,
            config,
            steps_executed: 0,
        })
    }

    /// 执行单步
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        let outcome = self.cpu.step()?;
        self.steps_executed += 1;
        Ok(outcome)
    }

    /// 运行直到退出、出错或达到步数上限
    pub fn run_until_exit(&mut self) -> Result<RunReport, SimError> {
        let max = if self.config.max_steps > 0 {
            self.config.max_steps
        } else {
            u64::MAX
        };

        for _ in 0..max {
            match self.step()? {
                StepOutcome::Continue => {}
                StepOutcome::Exit(status) => return Ok(self.report(Some(status))),
            }
        }

        Ok(self.report(None))
    }

    /// 汇总当前的运行报告
    pub fn report(&self, exit_status: Option<u32>) -> RunReport {
        RunReport {
            steps: self.steps_executed,
            pc: self.cpu.pc(),
            sp: self.cpu.sp(),
            exit_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stride_sim_{}_{}", std::process::id(), name))
    }

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// 构造一个单 PT_LOAD 段的最小 RISC-V ELF32
    fn make_elf(entry: u32, vaddr: u32, code: &[u32]) -> Vec<u8> {
        let body = words_to_bytes(code);
        let mut elf = Vec::new();

        // ELF 头（52 字节）
        elf.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]); // magic, ELF32, LE
        elf.extend_from_slice(&[0; 8]); // padding
        elf.extend_from_slice(&2u16.to_le_bytes()); // e_type = EXEC
        elf.extend_from_slice(&0xF3u16.to_le_bytes()); // e_machine = RISC-V
        elf.extend_from_slice(&1u32.to_le_bytes()); // e_version
        elf.extend_from_slice(&entry.to_le_bytes()); // e_entry
        elf.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        elf.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        elf.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        elf.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        // 程序头（32 字节）
        elf.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
        elf.extend_from_slice(&84u32.to_le_bytes()); // p_offset
        elf.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
        elf.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
        elf.extend_from_slice(&(body.len() as u32).to_le_bytes()); // p_filesz
        elf.extend_from_slice(&(body.len() as u32).to_le_bytes()); // p_memsz
        elf.extend_from_slice(&5u32.to_le_bytes()); // p_flags = R+X
        elf.extend_from_slice(&4u32.to_le_bytes()); // p_align

        elf.extend_from_slice(&body);
        elf
    }

    #[test]
    fn test_sim_config_builder() {
        let config = SimConfig::new()
            .with_img_path("demo.img")
            .with_entry_pc(0x100)
            .with_stack_pointer(0x8000)
            .with_max_steps(1000);

        assert_eq!(config.img_path.as_deref(), Some("demo.img"));
        assert_eq!(config.entry_pc, Some(0x100));
        assert_eq!(config.stack_pointer, Some(0x8000));
        assert_eq!(config.max_steps, 1000);
    }

    #[test]
    fn test_raw_image_verbatim() {
        // 原始镜像逐字节进入地址空间，大小即文件大小
        let path = temp_path("verbatim.img");
        let program = words_to_bytes(&[
            0x02A00093, // addi x1, x0, 42
            0x00000013, // nop
        ]);
        fs::write(&path, &program).unwrap();

        let config = SimConfig::new().with_img_path(path.to_string_lossy());
        let env = SimEnv::from_config(config).unwrap();

        assert_eq!(env.cpu.memory().size(), program.len());
        assert_eq!(env.cpu.memory().load32(0).unwrap(), 0x02A00093);
        assert_eq!(env.cpu.pc(), ENTRY_POINT_ADDR);
        assert_eq!(env.cpu.sp(), STACK_START_ADDR);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_raw_image_run_to_exit() {
        let path = temp_path("exit.img");
        let program = words_to_bytes(&[
            0x00A00293, // addi x5, x0, 10
            0x01400313, // addi x6, x0, 20
            0x006283B3, // add x7, x5, x6
            0x00700533, // add x10, x0, x7
            0x1F000893, // addi x17, x0, 0x1F0
            0x00000073, // ecall (exit)
        ]);
        fs::write(&path, &program).unwrap();

        let config = SimConfig::new()
            .with_img_path(path.to_string_lossy())
            .with_max_steps(100);
        let mut env = SimEnv::from_config(config).unwrap();
        let report = env.run_until_exit().unwrap();

        assert_eq!(report.exit_status, Some(30));
        assert_eq!(report.steps, 6);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_image_is_io_error() {
        let config = SimConfig::new().with_img_path("/nonexistent/stride_sim.img");
        assert!(matches!(
            SimEnv::from_config(config),
            Err(SimError::Io(_))
        ));
    }

    #[test]
    fn test_max_steps_limit() {
        let path = temp_path("limit.img");
        // 无限循环：beq x0, x0, 0 会回到自身
        let program = words_to_bytes(&[0x00000063]); // beq x0, x0, 0
        fs::write(&path, &program).unwrap();

        let config = SimConfig::new()
            .with_img_path(path.to_string_lossy())
            .with_max_steps(10);
        let mut env = SimEnv::from_config(config).unwrap();
        let report = env.run_until_exit().unwrap();

        assert_eq!(report.exit_status, None);
        assert_eq!(report.steps, 10);
        assert_eq!(report.pc, 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_entry_and_sp_overrides() {
        let path = temp_path("override.img");
        fs::write(&path, words_to_bytes(&[0x00000013; 8])).unwrap();

        let config = SimConfig::new()
            .with_img_path(path.to_string_lossy())
            .with_entry_pc(0x10)
            .with_stack_pointer(0x20);
        let env = SimEnv::from_config(config).unwrap();

        assert_eq!(env.cpu.pc(), 0x10);
        assert_eq!(env.cpu.sp(), 0x20);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_elf_parse_and_load() {
        let path = temp_path("prog.elf");
        let code = [
            0x02A00513, // addi x10, x0, 42
            0x1F000893, // addi x17, x0, 0x1F0
            0x00000073, // ecall (exit)
        ];
        fs::write(&path, make_elf(0x1000, 0x1000, &code)).unwrap();

        let image = ElfImage::parse(&path).unwrap();
        assert_eq!(image.entry, 0x1000);
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].vaddr, 0x1000);
        assert_eq!(image.address_end(), 0x1000 + 12);

        let config = SimConfig::new().with_elf_path(path.to_string_lossy());
        let mut env = SimEnv::from_config(config).unwrap();
        assert_eq!(env.cpu.pc(), 0x1000); // 入口取自 ELF 头

        let report = env.run_until_exit().unwrap();
        assert_eq!(report.exit_status, Some(42));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_elf_wrong_machine_rejected() {
        let path = temp_path("bad.elf");
        let mut elf = make_elf(0, 0, &[0x00000013]);
        elf[18] = 0x3E; // e_machine = x86-64
        fs::write(&path, &elf).unwrap();

        assert!(matches!(
            ElfImage::parse(&path),
            Err(SimError::ElfParse(_))
        ));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_run_report_display() {
        let report = RunReport {
            steps: 42,
            pc: 0x1000,
            sp: 0x8000,
            exit_status: Some(0),
        };
        let text = report.to_string();
        assert!(text.contains("final step count: 42"));
        assert!(text.contains("final pc: 0x1000"));
        assert!(text.contains("final sp: 0x8000"));
    }
}
