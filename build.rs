// 构建脚本: Windows MSVC 下静态链接 FFmpeg 时补充系统库
//
// 默认库列表可通过 TRIPWIRE_FFMPEG_LINK_LIBS (逗号分隔) 覆盖

#[cfg(all(target_os = "windows", target_env = "msvc"))]
const DEFAULT_LIBS: &[&str] = &[
    "libmfx",   // Intel QSV 硬件解码
    "oleaut32", // OLE 自动化
    "vfw32",
    "secur32",  // RTSP over TLS
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TRIPWIRE_FFMPEG_LINK_LIBS");

    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        let libs: Vec<String> = match std::env::var("TRIPWIRE_FFMPEG_LINK_LIBS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => DEFAULT_LIBS.iter().map(|s| s.to_string()).collect(),
        };
        for lib in libs {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }
    }
}
