use directories::UserDirs;
use std::{env, fs, path::PathBuf};

pub fn runtime_dir() -> PathBuf {
    // ~/.local/run, falling back to the temp dir without a home
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .unwrap_or_else(env::temp_dir);
    let dir = home.join(".local").join("run");
    let _ = fs::create_dir_all(&dir);
    dir
}

pub fn socket_path() -> PathBuf {
    runtime_dir().join("handctl.sock")
}
