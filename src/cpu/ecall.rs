//! ecall 系统调用层
//!
//! 选择子放在 a7，参数在 a0..a6，返回值写回 a0。
//! 宿主标准流通过 `HostIo` 注入，默认绑定进程的
//! stdin/stdout/stderr，测试中可以替换为内存缓冲。
//!
//! 读词/读串在外部输入流上阻塞；在一条指令完全退休前
//! 不会把控制权交还给调用方。

use std::io::{self, BufRead, Write};

use log::debug;

use super::{Cpu, CpuError, StepOutcome};
use crate::isa::reg;
use crate::memory::Memory;

// ========== ecall 选择子 ==========

/// sbrk
pub const ECALL_SBRK: u32 = 0x0D6; // 214
/// 从标准输入读一个整数
pub const ECALL_IN_WORD: u32 = 0x100;
/// 从标准输入读一行到内存缓冲
pub const ECALL_IN_STR: u32 = 0x101;
/// 把 a0 按十六进制写到标准输出
pub const ECALL_OUT_WORD: u32 = 0x110;
/// 把 a0 处的 NUL 结尾字符串写到标准输出
pub const ECALL_OUT_STR: u32 = 0x111;
/// `ECALL_OUT_WORD` 的诊断流版本
pub const ECALL_ERR_WORD: u32 = 0x120;
/// `ECALL_OUT_STR` 的诊断流版本
pub const ECALL_ERR_STR: u32 = 0x121;
/// 以 a0 为状态码退出
pub const ECALL_EXIT: u32 = 0x1F0;

// ========== 布局常量 ==========

/// 堆起始地址（512 KiB）；必须大于镜像的 `_end`
pub const HEAP_START_ADDR: u32 = 0x8_0000;

/// 读串的最大缓冲长度（含 NUL 结尾）
pub const INPUT_BUFFER_SIZE: usize = 0x100; // 256 字节

/// 宿主标准流
///
/// 三个流分别对应标准输入、标准输出与诊断输出。
pub struct HostIo {
    pub(super) input: Box<dyn BufRead>,
    pub(super) output: Box<dyn Write>,
    pub(super) error: Box<dyn Write>,
}

impl HostIo {
    /// 绑定进程的标准流
    pub fn stdio() -> Self {
        HostIo {
            input: Box::new(io::BufReader::new(io::stdin())),
            output: Box::new(io::stdout()),
            error: Box::new(io::stderr()),
        }
    }

    /// 用任意流构造（测试中用内存缓冲替代标准流）
    pub fn new(
        input: Box<dyn BufRead>,
        output: Box<dyn Write>,
        error: Box<dyn Write>,
    ) -> Self {
        HostIo {
            input,
            output,
            error,
        }
    }
}

impl Default for HostIo {
    fn default() -> Self {
        Self::stdio()
    }
}

/// 按 a7 中的选择子分派系统调用
pub(super) fn dispatch(cpu: &mut Cpu) -> Result<StepOutcome, CpuError> {
    let code = cpu.regs.read(reg::A7);

    match code {
        ECALL_SBRK => sbrk(cpu),
        ECALL_IN_WORD => in_word(cpu)?,
        ECALL_IN_STR => in_str(cpu)?,
        ECALL_OUT_WORD => out_word(&mut cpu.io.output, cpu.regs.read(reg::A0)),
        ECALL_OUT_STR => out_str(&cpu.mem, &mut cpu.io.output, cpu.regs.read(reg::A0))?,
        ECALL_ERR_WORD => out_word(&mut cpu.io.error, cpu.regs.read(reg::A0)),
        ECALL_ERR_STR => out_str(&cpu.mem, &mut cpu.io.error, cpu.regs.read(reg::A0))?,
        ECALL_EXIT => {
            let status = cpu.regs.read(reg::A0);
            debug!("ecall exit: status={}", status);
            return Ok(StepOutcome::Exit(status));
        }
        _ => return Err(CpuError::UnsupportedSyscall { code }),
    }

    Ok(StepOutcome::Continue)
}

/// sbrk：a0 == 0 的查询返回堆起始地址，其余请求一概原样放行。
/// 不跟踪真实的 program break；下游测试程序依赖这一行为。
fn sbrk(cpu: &mut Cpu) {
    let a0 = cpu.regs.read(reg::A0);
    let brk = if a0 == 0 { HEAP_START_ADDR } else { a0 };
    cpu.regs.write(reg::A0, brk);
    debug!("ecall sbrk({:#x}) -> {:#x}", a0, brk);
}

/// 从输入流读一行，解析行首的整数 token 到 a0，行的其余部分丢弃
fn in_word(cpu: &mut Cpu) -> Result<(), CpuError> {
    let line = read_input_line(&mut cpu.io.input)?;
    let token = line
        .split_whitespace()
        .next()
        .ok_or_else(|| CpuError::Input("empty input line".into()))?;
    let value = parse_word(token)
        .ok_or_else(|| CpuError::Input(format!("invalid integer {:?}", token)))?;

    cpu.regs.write(reg::A0, value);
    debug!("ecall in_word -> {:#x}", value);
    Ok(())
}

/// 从输入流读一行写入 a0 处的内存缓冲，NUL 结尾，
/// 上限 `INPUT_BUFFER_SIZE`（含结尾），且不越过内存末尾
fn in_str(cpu: &mut Cpu) -> Result<(), CpuError> {
    let addr = cpu.regs.read(reg::A0);
    let line = read_input_line(&mut cpu.io.input)?;

    let span = cpu.mem.tail_mut(addr)?;
    let cap = span.len().min(INPUT_BUFFER_SIZE);
    let len = line.len().min(cap - 1);
    span[..len].copy_from_slice(&line.as_bytes()[..len]);
    span[len] = 0;

    debug!("ecall in_str: {} bytes at {:#x}", len + 1, addr);
    Ok(())
}

/// a0 按固定宽度、带 0x 前缀的十六进制输出，换行结尾
fn out_word(stream: &mut dyn Write, value: u32) {
    let _ = writeln!(stream, "{:#010x}", value);
}

/// 输出 a0 处的字节串，至第一个 NUL（或内存末尾）为止
fn out_str(mem: &Memory, stream: &mut dyn Write, addr: u32) -> Result<(), CpuError> {
    let span = mem.tail(addr)?;
    let len = span.iter().position(|&b| b == 0).unwrap_or(span.len());
    let _ = stream.write_all(&span[..len]);
    let _ = stream.flush();
    Ok(())
}

/// 读一行（去掉行尾换行符）；流关闭或读取失败报 `Input`
fn read_input_line(input: &mut dyn BufRead) -> Result<String, CpuError> {
    let mut line = String::new();
    let n = input
        .read_line(&mut line)
        .map_err(|e| CpuError::Input(e.to_string()))?;
    if n == 0 {
        return Err(CpuError::Input("input stream closed".into()));
    }

    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}

/// 十进制整数解析；接受负号，按寄存器宽度回绕
fn parse_word(token: &str) -> Option<u32> {
    match token.strip_prefix('-') {
        Some(rest) => rest.parse::<u32>().ok().map(u32::wrapping_neg),
        None => token.parse::<u32>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("42"), Some(42));
        assert_eq!(parse_word("0"), Some(0));
        assert_eq!(parse_word("-1"), Some(u32::MAX));
        assert_eq!(parse_word("4294967295"), Some(u32::MAX));
        assert_eq!(parse_word("abc"), None);
        assert_eq!(parse_word(""), None);
    }

    #[test]
    fn test_out_word_format() {
        let mut buf: Vec<u8> = Vec::new();
        out_word(&mut buf, 0x2A);
        assert_eq!(buf, b"0x0000002a\n");

        buf.clear();
        out_word(&mut buf, 0xDEADBEEF);
        assert_eq!(buf, b"0xdeadbeef\n");
    }

    #[test]
    fn test_out_str_stops_at_nul() {
        let mem = Memory::from_image(b"hi\0tail".to_vec());
        let mut buf: Vec<u8> = Vec::new();
        out_str(&mem, &mut buf, 0).unwrap();
        assert_eq!(buf, b"hi");

        // 没有 NUL 时输出到内存末尾为止
        buf.clear();
        out_str(&mem, &mut buf, 3).unwrap();
        assert_eq!(buf, b"tail");

        // 起始地址本身越界
        let mut sink: Vec<u8> = Vec::new();
        assert!(out_str(&mem, &mut sink, 7).is_err());
    }

    #[test]
    fn test_read_input_line_strips_newline() {
        let mut input: &[u8] = b"hello\r\nnext";
        assert_eq!(read_input_line(&mut input).unwrap(), "hello");
        assert_eq!(read_input_line(&mut input).unwrap(), "next");
        assert!(read_input_line(&mut input).is_err()); // 流已耗尽
    }
}
