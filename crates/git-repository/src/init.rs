use std::fs;
use std::path::Path;

use crate::{DiscoveredRepo, InitOptions, RepoError, RepositoryKind};

/// Initialize a new git repository.
///
/// Creates exactly the layout this core cares about:
/// - `HEAD` (symbolic ref to the default branch)
/// - `config`
/// - `objects/`, `objects/pack/`
/// - `refs/heads/`, `refs/remotes/`
///
/// Hooks, an editable `description`, `info/exclude`, and `refs/tags/` are
/// CLI/porcelain conveniences this core never reads back; not created.
pub fn init_repository(path: &Path, options: &InitOptions) -> Result<DiscoveredRepo, RepoError> {
    let path = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };

    let (git_dir, work_tree) = if options.bare {
        (path.clone(), None)
    } else {
        (path.join(".git"), Some(path.clone()))
    };

    if git_dir.join("HEAD").is_file() {
        // Re-running init on an existing repo is a safe no-op; existing
        // data is never overwritten.
        return Ok(DiscoveredRepo {
            git_dir: git_dir.clone(),
            work_tree,
            common_dir: git_dir,
            kind: if options.bare { RepositoryKind::Bare } else { RepositoryKind::Normal },
        });
    }

    fs::create_dir_all(git_dir.join("objects").join("pack"))?;
    fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    fs::create_dir_all(git_dir.join("refs").join("remotes"))?;

    let default_branch = options.default_branch.as_deref().unwrap_or("main");
    fs::write(git_dir.join("HEAD"), format!("ref: refs/heads/{default_branch}\n"))?;

    let config_content = if options.bare {
        "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = true\n"
    } else {
        "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = false\n\tlogallrefupdates = true\n"
    };
    fs::write(git_dir.join("config"), config_content)?;

    Ok(DiscoveredRepo {
        git_dir: git_dir.clone(),
        work_tree,
        common_dir: git_dir,
        kind: if options.bare { RepositoryKind::Bare } else { RepositoryKind::Normal },
    })
}
