use chrono::Utc;

fn main() {
    // 构建时间，/api/health 与启动日志会输出
    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);
    println!("cargo:rerun-if-changed=build.rs");
}
