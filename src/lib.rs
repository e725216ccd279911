//! stride_sim: RV32I 逐周期仿真库
//!
//! 本库实现了一个功能正确、结构清晰的单线程 RV32I 仿真引擎：
//! 取指、解码、执行逐条推进，一条指令完全退休后才开始下一条。
//!
//! # 模块结构
//!
//! - `isa`: RISC-V ISA 词汇表（位域工具、指令记录）与解码器
//! - `cpu`: CPU 核心与执行引擎（寄存器文件、PC、ecall 系统调用层）
//! - `memory`: 字节寻址的平坦内存
//! - `sim_env`: 仿真环境（配置、镜像加载、运行与结果报告）

pub mod cpu;
pub mod isa;
pub mod memory;
pub mod sim_env;
