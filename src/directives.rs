//! Batch job directives and job-manager variables.
//!
//! [`SlurmDirectives`] is the resource request placed at the top of every
//! job (`#SBATCH` lines), built from the task's ecFlow variables.
//! [`troika_vars`] produces the ecFlow variables that make the server submit,
//! monitor and kill jobs through troika.

use crate::config::ManagerSettings;
use crate::context::VarMap;
use crate::error::{EcfjobError, Result};

/// Memory per cpu (MB) when `MEM` is not set.
pub const DEFAULT_MEM_PER_CPU_MB: u32 = 12800;

/// Local SSD scratch requested per job when `SCRATCH_SIZE` is not set.
pub const DEFAULT_SCRATCH_SIZE: &str = "5G";

/// Job name prefix when the task has no `FAMILY1`.
pub const DEFAULT_FAMILY: &str = "NOT_DEF";

const SUBMIT_CMD: &str =
    "%TROIKA% -vv -c %TROIKA_CONFIG% submit -u %USER% -o %ECF_JOBOUT% %REMOTE_HOST% %ECF_JOB%";
const STATUS_CMD: &str = "%TROIKA% -vv -c %TROIKA_CONFIG% monitor %REMOTE_HOST% %ECF_JOB%";
const KILL_CMD: &str = "%TROIKA% -vv -c %TROIKA_CONFIG% kill %REMOTE_HOST% %ECF_JOB%";

/// SLURM resource request for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmDirectives {
    /// Job output file; stderr goes to the same file.
    pub output: String,
    pub job_name: String,
    pub qos: String,
    pub account: String,
    pub mem_per_cpu_mb: u32,
    pub cpus_per_task: u32,
    /// Storage host exported into the job environment.
    pub sthost: String,
    pub scratch_size: String,
}

impl SlurmDirectives {
    /// Build the directives from ecFlow variables.
    ///
    /// `ECF_JOBOUT`, `TASK`, `QUEUE`, `ACCOUNT` and `STHOST` are required.
    /// `FAMILY1`, `MEM`, `NCPUS` and `SCRATCH_SIZE` have defaults.
    pub fn from_vars(vars: &VarMap) -> Result<Self> {
        let family = vars.get("FAMILY1").map(String::as_str).unwrap_or(DEFAULT_FAMILY);
        let task = required(vars, "TASK")?;

        Ok(Self {
            output: required(vars, "ECF_JOBOUT")?.to_string(),
            job_name: format!("{}_{}", family, task),
            qos: required(vars, "QUEUE")?.to_string(),
            account: required(vars, "ACCOUNT")?.to_string(),
            mem_per_cpu_mb: number_or(vars, "MEM", DEFAULT_MEM_PER_CPU_MB)?,
            cpus_per_task: number_or(vars, "NCPUS", 1)?,
            sthost: required(vars, "STHOST")?.to_string(),
            scratch_size: vars
                .get("SCRATCH_SIZE")
                .filter(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_SCRATCH_SIZE.to_string()),
        })
    }

    /// The directives as `#SBATCH` lines, in submission order.
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("#SBATCH --output={}", self.output),
            format!("#SBATCH --error={}", self.output),
            format!("#SBATCH --job-name={}", self.job_name),
            format!("#SBATCH --qos={}", self.qos),
            format!("#SBATCH --account={}", self.account),
            format!("#SBATCH --mem-per-cpu={}M", self.mem_per_cpu_mb),
            format!("#SBATCH --cpus-per-task={}", self.cpus_per_task),
            format!("#SBATCH --export=STHOST={}", self.sthost),
            format!("#SBATCH --gres=ssdtmp:{}", self.scratch_size),
        ]
    }

    /// The directives block with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = self.lines().join("\n");
        out.push('\n');
        out
    }
}

/// ecFlow variables that route job submission through troika.
///
/// Empty when the server already carries these settings.
pub fn troika_vars(manager: &ManagerSettings) -> Vec<(String, String)> {
    if manager.settings_from_server {
        return Vec::new();
    }
    vec![
        ("TROIKA".to_string(), manager.executable.clone()),
        ("TROIKA_CONFIG".to_string(), manager.config.clone()),
        ("ECF_JOB_CMD".to_string(), SUBMIT_CMD.to_string()),
        ("ECF_STATUS_CMD".to_string(), STATUS_CMD.to_string()),
        ("ECF_KILL_CMD".to_string(), KILL_CMD.to_string()),
    ]
}

/// Format variables as ecFlow definition `edit` lines.
pub fn edit_lines(vars: &[(String, String)]) -> Vec<String> {
    vars.iter()
        .map(|(name, value)| format!("edit {} '{}'", name, value.replace('\'', "\\'")))
        .collect()
}

fn required<'a>(vars: &'a VarMap, key: &str) -> Result<&'a str> {
    vars.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            EcfjobError::UserError(format!(
                "{} is required for the job directives but is not set",
                key
            ))
        })
}

fn number_or(vars: &VarMap, key: &str, default: u32) -> Result<u32> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(EcfjobError::UserError(format!(
                "{} must be a positive number, got '{}'",
                key, v
            ))),
        },
    }
}
