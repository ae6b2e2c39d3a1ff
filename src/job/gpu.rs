use tokio::process::Command;

/// GPUs reported by `nvidia-smi --list-gpus`. Empty when the tool is
/// missing or fails; the job continues either way.
pub async fn list_gpus() -> Vec<String> {
    match Command::new("nvidia-smi").arg("--list-gpus").output().await {
        Ok(output) if output.status.success() => {
            let gpus = parse_gpu_list(&String::from_utf8_lossy(&output.stdout));
            for gpu in &gpus {
                tracing::info!("[GPU] {}", gpu);
            }
            if gpus.is_empty() {
                tracing::warn!("[GPU] no gpu found");
            }
            gpus
        }
        Ok(output) => {
            tracing::warn!("[GPU] nvidia-smi exited with {}; no gpu found", output.status);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("[GPU] cannot run nvidia-smi ({}); no gpu found", e);
            Vec::new()
        }
    }
}

fn parse_gpu_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
