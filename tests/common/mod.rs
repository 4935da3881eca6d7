//! Shared fixtures for integration tests
//!
//! Builds a miniature kernel source tree plus a stub build tool that
//! imitates just enough of the real one: it logs every invocation, honors
//! `-C`, `-j`, and targets, produces a `vmlinux` image and a `built-in.a`
//! unit on build, wipes them on `mrproper`, and fails on configurations
//! containing `CONFIG_BREAK=y`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use kincbench::LaneSettings;

/// One self-contained test lane: kernel tree, stub tool, settings.
pub struct Lane {
    pub dir: TempDir,
    pub kernel_dir: PathBuf,
    pub log: PathBuf,
    pub settings: LaneSettings,
}

/// Create a lane with a fresh miniature kernel tree and stub build tool.
pub fn setup() -> Lane {
    let dir = TempDir::new().unwrap();
    let kernel_dir = dir.path().join("linux");
    fs::create_dir_all(kernel_dir.join("scripts")).unwrap();
    fs::create_dir_all(kernel_dir.join("drivers/hid")).unwrap();
    fs::write(kernel_dir.join("Makefile"), "all:\n").unwrap();
    fs::write(kernel_dir.join("drivers/hid/hid.c"), "/* hid */\n").unwrap();

    let bloat = kernel_dir.join("scripts/bloat-o-meter");
    write_executable(
        &bloat,
        "#!/bin/sh\necho \"add/remove: 0/0 grow/shrink: 0/0 ($1 -> $2)\"\n",
    );

    let log = dir.path().join("make.log");
    let make = dir.path().join("fake-make");
    write_executable(&make, &stub_make_script(&log));

    let settings = LaneSettings {
        make_program: make.to_string_lossy().into_owned(),
        jobs: 2,
        build_timeout_seconds: None,
        output_root: dir.path().join("out"),
    };

    Lane {
        dir,
        kernel_dir,
        log,
        settings,
    }
}

impl Lane {
    /// Write a configuration file under `configs/` and return its path.
    pub fn write_config(&self, name: &str, text: &str) -> PathBuf {
        let configs = self.dir.path().join("configs");
        fs::create_dir_all(&configs).unwrap();
        let path = configs.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    /// Every `(target, tree)` pair the stub tool was invoked with.
    pub fn invocations(&self) -> Vec<(String, String)> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(|line| {
                let (target, tree) = line.split_once(' ').unwrap_or((line, ""));
                (target.to_string(), tree.to_string())
            })
            .collect()
    }

    /// Number of `build` invocations against the given tree.
    pub fn builds_on(&self, tree: &Path) -> usize {
        let tree = tree.to_string_lossy().into_owned();
        self.invocations()
            .iter()
            .filter(|(target, dir)| target == "build" && *dir == tree)
            .count()
    }

    /// Number of `build` invocations against the pristine kernel tree,
    /// i.e. from-scratch builds.
    pub fn scratch_builds(&self) -> usize {
        self.builds_on(&self.kernel_dir)
    }
}

fn stub_make_script(log: &Path) -> String {
    format!(
        r#"#!/bin/sh
dir=""
target="build"
expect_dir=0
for a in "$@"; do
  if [ "$expect_dir" = 1 ]; then dir="$a"; expect_dir=0; continue; fi
  case "$a" in
    -C) expect_dir=1 ;;
    -j*) ;;
    O=*) ;;
    *) target="$a" ;;
  esac
done
echo "$target $dir" >> "{log}"
case "$target" in
  mrproper)
    rm -f "$dir/vmlinux" "$dir/.config"
    find "$dir" -name 'built-in.a' -delete
    ;;
  randconfig|tinyconfig)
    echo "CONFIG_GEN=y" > "$dir/.config"
    ;;
  build)
    if grep -q BREAK "$dir/.config" 2>/dev/null; then
      echo "error: broken configuration" >&2
      exit 2
    fi
    mkdir -p "$dir/drivers"
    if [ -f "$dir/.config" ]; then
      cp "$dir/.config" "$dir/vmlinux"
    else
      echo none > "$dir/vmlinux"
    fi
    echo unit > "$dir/drivers/built-in.a"
    ;;
esac
exit 0
"#,
        log = log.display()
    )
}

fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}
