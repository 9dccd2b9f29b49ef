//! Utility functions for the test harness.

/// Names under which the host architecture may appear in `skip-on-archs`.
///
/// Includes both the Rust target name and the name `uname -m` reports.
pub fn host_arch_names() -> Vec<String> {
    arch_aliases(std::env::consts::ARCH, cfg!(target_endian = "little"))
}

fn arch_aliases(arch: &str, little_endian: bool) -> Vec<String> {
    let aliases: &[&str] = match arch {
        "x86_64" => &["x86_64", "amd64"],
        "x86" => &["x86", "i386", "i686"],
        "aarch64" => &["aarch64", "arm64"],
        "powerpc64" if little_endian => &["powerpc64", "ppc64le"],
        "powerpc64" => &["powerpc64", "ppc64"],
        "s390x" => &["s390x"],
        "riscv64" => &["riscv64"],
        other => return vec![other.to_owned()],
    };

    aliases.iter().map(|s| String::from(*s)).collect()
}

/// Renders a command line for logs, quoting arguments that contain whitespace.
pub fn display_command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = String::from(program);
    for arg in args {
        let arg = arg.as_ref();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('\'');
            line.push_str(arg);
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}
