//! Dependency installation
//!
//! Installs the exported requirements either with the local interpreter's pip
//! or inside a throwaway container. The container path mounts the dependency
//! target, the source root and the requirements manifest into a build image,
//! runs pip there, and restores host ownership of everything the container
//! wrote before tearing the container down.

use bollard::container::{Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::service::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{PackError, Result};
use crate::exec::{run_capture, run_streamed};
use crate::project::Project;
use crate::runtime::Runtime;

const CONTAINER_DEPS: &str = "/var/deps";
const CONTAINER_TASK: &str = "/var/task";
const CONTAINER_REQUIREMENTS: &str = "/var/packbox/requirements.txt";
const CONTAINER_CACHE: &str = "/var/cache/packbox";

/// Probe the local interpreter and map its version to a runtime. `None`
/// when no interpreter is on PATH or its version is unsupported.
pub async fn detect_local_runtime() -> Result<Option<Runtime>> {
    let Some(python) = local_interpreter() else {
        return Ok(None);
    };
    let output = run_capture(&python, &["--version"], &std::env::temp_dir()).await?;
    Ok(Runtime::from_interpreter_version(&output))
}

/// Pick the runtime for this build. A declared runtime always wins; the
/// install step still cross-checks it against the interpreter that actually
/// runs pip. Without a declaration the local interpreter decides, which
/// rules out isolated builds with no runtime named.
pub async fn resolve_runtime(project: &Project) -> Result<Runtime> {
    let config = project.config();
    if let Some(declared) = config.runtime {
        return Ok(declared);
    }
    if config.docker_enabled {
        return Err(PackError::Configuration(
            "Isolated builds need an explicit runtime".to_string(),
        ));
    }
    match detect_local_runtime().await? {
        Some(detected) => {
            info!(runtime = %detected, "Using runtime detected from local interpreter");
            Ok(detected)
        }
        None => Err(PackError::Configuration(
            "No runtime declared and no local Python interpreter found".to_string(),
        )),
    }
}

/// Install the exported requirements into the project's dependency directory
pub async fn install_dependencies(
    project: &Project,
    runtime: Runtime,
    requirements: &Path,
) -> Result<()> {
    if project.config().docker_enabled {
        let builder = DockerBuilder::connect().await?;
        builder.install(project, runtime, requirements).await
    } else {
        install_local(project, runtime, requirements).await
    }
}

async fn install_local(project: &Project, runtime: Runtime, requirements: &Path) -> Result<()> {
    let python = local_interpreter().ok_or_else(|| {
        PackError::Configuration("No Python interpreter found on PATH".to_string())
    })?;

    // Installing with the wrong interpreter would silently produce wheels
    // for the wrong runtime
    let output = run_capture(&python, &["--version"], &std::env::temp_dir()).await?;
    if let Some(detected) = Runtime::from_interpreter_version(&output) {
        if detected != runtime {
            return Err(PackError::RuntimeMismatch {
                declared: runtime.to_string(),
                detected: detected.to_string(),
            });
        }
    }

    let deps = project.deps_dir()?;
    let requirements = requirements.display().to_string();
    let target = deps.display().to_string();

    let mut args = vec![
        "-m",
        "pip",
        "install",
        "-r",
        &requirements,
        "-t",
        &target,
        "--upgrade",
    ];
    let cache_dir = project.cache_dir()?.map(|d| d.display().to_string());
    match &cache_dir {
        Some(dir) => {
            args.push("--cache-dir");
            args.push(dir);
        }
        None => args.push("--no-cache-dir"),
    }

    info!(interpreter = %python, "Installing dependencies locally");
    run_streamed(&python, &args, project.root(), &[]).await?;
    Ok(())
}

fn local_interpreter() -> Option<String> {
    ["python3", "python"]
        .iter()
        .find(|name| which::which(name).is_ok())
        .map(|name| name.to_string())
}

/// Installs dependencies inside a disposable container so native wheels are
/// built for the target runtime regardless of the host
pub struct DockerBuilder {
    docker: Docker,
}

impl DockerBuilder {
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            PackError::BuildEnvironment(format!("Cannot connect to Docker: {e}"))
        })?;
        docker.ping().await.map_err(|e| {
            PackError::BuildEnvironment(format!("Docker daemon did not answer ping: {e}"))
        })?;
        Ok(Self { docker })
    }

    pub async fn install(
        &self,
        project: &Project,
        runtime: Runtime,
        requirements: &Path,
    ) -> Result<()> {
        let image = self.select_image(project, runtime).await?;
        let container_id = self.create_build_container(project, &image, requirements).await?;

        let result = self.run_install_phases(project, &container_id).await;

        // Teardown runs on success and failure alike; a leaked container
        // would hold the bind mounts open
        let remove = self
            .docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = remove {
            debug!(container = %container_id, error = %e, "Failed to remove build container");
        }

        result
    }

    /// Resolve the build image: a configured Dockerfile wins, then an
    /// explicit image reference, then the runtime's default public image
    async fn select_image(&self, project: &Project, runtime: Runtime) -> Result<String> {
        let config = project.config();

        if let Some(dockerfile) = &config.dockerfile {
            let tag = format!("packbox-build:{}", project.source_hash()?);
            self.build_dockerfile_image(dockerfile, &tag).await?;
            return Ok(tag);
        }

        let reference = config
            .image
            .clone()
            .unwrap_or_else(|| runtime.default_build_image());
        self.ensure_image(&reference).await?;
        Ok(reference)
    }

    async fn build_dockerfile_image(&self, dockerfile: &Path, tag: &str) -> Result<()> {
        info!(dockerfile = %dockerfile.display(), tag = %tag, "Building isolated-build image");

        let mut context = tar::Builder::new(Vec::new());
        context.append_path_with_name(dockerfile, "Dockerfile")?;
        let context = context.into_inner()?;

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };
        let mut stream =
            self.docker
                .build_image(options, None, Some(bytes::Bytes::from(context)));
        while let Some(message) = stream.next().await {
            let info = message.map_err(|e| {
                PackError::BuildEnvironment(format!("Image build failed: {e}"))
            })?;
            if let Some(error) = info.error {
                return Err(PackError::BuildEnvironment(format!(
                    "Image build failed: {error}"
                )));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    info!(target: "packbox::docker", "{}", line);
                }
            }
        }
        Ok(())
    }

    async fn ensure_image(&self, reference: &str) -> Result<()> {
        if self.docker.inspect_image(reference).await.is_ok() {
            return Ok(());
        }
        info!(image = %reference, "Pulling build image");
        let options = CreateImageOptions::<String> {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(message) = stream.next().await {
            message.map_err(|e| {
                PackError::BuildEnvironment(format!("Cannot pull image '{reference}': {e}"))
            })?;
        }
        Ok(())
    }

    async fn create_build_container(
        &self,
        project: &Project,
        image: &str,
        requirements: &Path,
    ) -> Result<String> {
        let deps = project.deps_dir()?;
        let mut binds = vec![
            format!("{}:{}", deps.display(), CONTAINER_DEPS),
            format!("{}:{}:ro", project.root().display(), CONTAINER_TASK),
            format!("{}:{}:ro", requirements.display(), CONTAINER_REQUIREMENTS),
        ];
        let mut env = filtered_env(&project.config().env_prefixes);
        if let Some(cache) = project.cache_dir()? {
            binds.push(format!("{}:{}", cache.display(), CONTAINER_CACHE));
            env.push(format!("PIP_CACHE_DIR={CONTAINER_CACHE}"));
        }

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            env: Some(env),
            working_dir: Some(CONTAINER_TASK.to_string()),
            host_config: Some(HostConfig {
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| {
                PackError::BuildEnvironment(format!("Cannot create build container: {e}"))
            })?;
        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                PackError::BuildEnvironment(format!("Cannot start build container: {e}"))
            })?;
        debug!(container = %container.id, image = %image, "Build container started");
        Ok(container.id)
    }

    async fn run_install_phases(&self, project: &Project, container_id: &str) -> Result<()> {
        let owner = host_owner(project.root())?;

        // pip inside the container runs as root; hand it the mount first so
        // installs into a host-owned directory cannot fail on permissions
        if owner.is_some() {
            exec_in(&self.docker, container_id, &["chown", "-R", "0:0", CONTAINER_DEPS]).await?;
        }

        let mut install = vec![
            "pip",
            "install",
            "-r",
            CONTAINER_REQUIREMENTS,
            "-t",
            CONTAINER_DEPS,
            "--upgrade",
        ];
        if project.cache_dir()?.is_none() {
            install.push("--no-cache-dir");
        }
        let install_result = exec_in(&self.docker, container_id, &install).await;

        // Ownership goes back to the host user even when the install failed,
        // otherwise cleanup of the build directory needs root
        if let Some((uid, gid)) = owner {
            let spec = format!("{uid}:{gid}");
            let restore =
                exec_in(&self.docker, container_id, &["chown", "-R", &spec, CONTAINER_DEPS]).await;
            return merge_install_and_restore(install_result, restore);
        }

        install_result.map(|_| ())
    }
}

/// A failed ownership restore only surfaces when the install itself
/// succeeded; an install failure is always the error the caller sees
fn merge_install_and_restore(install: Result<String>, restore: Result<String>) -> Result<()> {
    match (install, restore) {
        (Ok(_), Ok(_)) => Ok(()),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(install_err), Err(restore_err)) => {
            warn!(error = %restore_err, "Failed to restore dependency directory ownership");
            Err(install_err)
        }
    }
}

/// Run one command in the build container, streaming output to the logger
async fn exec_in(docker: &Docker, container_id: &str, cmd: &[&str]) -> Result<String> {
    let rendered = cmd.join(" ");
    debug!(container = %container_id, command = %rendered, "Running container command");

    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions::<String> {
                cmd: Some(cmd.iter().map(|s| s.to_string()).collect()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| PackError::BuildEnvironment(format!("Cannot create exec: {e}")))?;

    let mut collected = Vec::new();
    let started = docker
        .start_exec(&exec.id, None::<StartExecOptions>)
        .await
        .map_err(|e| PackError::BuildEnvironment(format!("Cannot start exec: {e}")))?;
    if let StartExecResults::Attached { mut output, .. } = started {
        while let Some(chunk) = output.next().await {
            let chunk = chunk
                .map_err(|e| PackError::BuildEnvironment(format!("Exec stream failed: {e}")))?;
            for line in chunk.to_string().lines() {
                info!(target: "packbox::docker", "{}", line);
                collected.push(line.to_string());
            }
        }
    }

    let inspect = docker
        .inspect_exec(&exec.id)
        .await
        .map_err(|e| PackError::BuildEnvironment(format!("Cannot inspect exec: {e}")))?;
    let status = inspect.exit_code.unwrap_or(-1);
    let combined = collected.join("\n");
    if status != 0 {
        return Err(PackError::CommandFailure {
            command: rendered,
            status: status as i32,
            output: combined,
        });
    }
    Ok(combined)
}

fn filtered_env(prefixes: &[String]) -> Vec<String> {
    std::env::vars()
        .filter(|(key, _)| prefixes.iter().any(|prefix| key.starts_with(prefix)))
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

#[cfg(unix)]
fn host_owner(path: &Path) -> Result<Option<(u32, u32)>> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path)?;
    Ok(Some((meta.uid(), meta.gid())))
}

#[cfg(not(unix))]
fn host_owner(_path: &Path) -> Result<Option<(u32, u32)>> {
    Ok(None)
}
