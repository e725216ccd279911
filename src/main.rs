//! stride_sim CLI 入口
//!
//! 装载内存镜像，按步数预算驱动 CPU，结束后打印最终状态报告。
//! 客户程序经 ecall 退出时，本进程以相同的状态码退出。

use std::process;

use clap::Parser;

use stride_sim::sim_env::{DEFAULT_IMG_PATH, SimConfig, SimEnv, SimError};

/// RV32I 逐周期仿真器
#[derive(Parser, Debug)]
#[command(name = "stride_sim_cli", version, about = "RV32I 逐周期仿真器")]
struct Cli {
    /// 原始内存镜像路径（字节原样进入地址空间）
    #[arg(default_value = DEFAULT_IMG_PATH)]
    image: String,

    /// 以 RISC-V ELF32 方式装载（优先于原始镜像）
    #[arg(long)]
    elf: Option<String>,

    /// 最大执行步数（0 表示不限制）
    #[arg(long, default_value_t = 0)]
    steps: u64,

    /// 覆盖入口 PC（十进制或 0x 前缀十六进制）
    #[arg(long, value_parser = parse_addr)]
    pc: Option<u32>,

    /// 覆盖栈顶地址（十进制或 0x 前缀十六进制）
    #[arg(long, value_parser = parse_addr)]
    sp: Option<u32>,

    /// 打印装载细节
    #[arg(long)]
    verbose: bool,
}

/// 地址解析：十进制或 0x 前缀十六进制
fn parse_addr(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = SimConfig::new()
        .with_max_steps(cli.steps)
        .with_verbose(cli.verbose);
    config = match cli.elf {
        Some(elf) => config.with_elf_path(elf),
        None => config.with_img_path(cli.image),
    };
    if let Some(pc) = cli.pc {
        config = config.with_entry_pc(pc);
    }
    if let Some(sp) = cli.sp {
        config = config.with_stack_pointer(sp);
    }

    process::exit(run(config));
}

/// 运行仿真并返回进程退出码
fn run(config: SimConfig) -> i32 {
    let mut env = match SimEnv::from_config(config) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("stride_sim_cli: {}", e);
            return 1;
        }
    };

    match env.run_until_exit() {
        Ok(report) => {
            println!("{}", report);
            match report.exit_status {
                // 客户程序的退出状态透传给宿主
                Some(status) => status as i32,
                None => 0,
            }
        }
        Err(SimError::Cpu(e)) => {
            // 失败的 step 停在失败点；报告里是出错时刻的状态
            eprintln!("stride_sim_cli: {}", e);
            println!("{}", env.report(None));
            1
        }
        Err(e) => {
            eprintln!("stride_sim_cli: {}", e);
            1
        }
    }
}
