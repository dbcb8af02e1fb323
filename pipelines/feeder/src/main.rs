//! 数据集物化流水线.
//!
//! 从按标签组织的 DICOM 目录树出发, 组装扫描表与元信息表, 做可复现的
//! 70/20/10 分层划分, 并行物化三个分区, 最终把对齐张量组落盘为 `.npy`.

use std::process::ExitCode;

mod report;
mod runner;

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Info).unwrap();
    match runner::run() {
        Ok(summary) => {
            summary.print();
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("物化流水线失败: {e}");
            ExitCode::FAILURE
        }
    }
}
