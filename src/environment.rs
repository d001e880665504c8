//! Task environment.
//!
//! Everything a task body expects to find in its environment: the ecFlow
//! endpoint, the temp directory and cpu count, the suite layout from the
//! deploy config, the conda environment, the RAPID toolchain and the
//! forecast run variables. The result is passed to the child process
//! explicitly or printed as shell `export` lines.

use crate::config::Config;
use crate::context::TaskContext;
use crate::error::Result;
use crate::forecast::EnsembleRun;
use crate::resolver::ResolvedConfig;

/// File creation mask applied to tasks, as exported in `ECUMASK`.
pub const TASK_UMASK: u32 = 0o022;

/// PETSc build used by RAPID.
pub const PETSC_VERSION: &str = "petsc-3.13.0";
pub const PETSC_ARCH: &str = "linux-gcc-c";

/// Ordered set of environment variables for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEnvironment {
    vars: Vec<(String, String)>,
}

impl TaskEnvironment {
    /// Build the environment for a task.
    ///
    /// Suite, conda, RAPID and forecast variables need the deploy config and
    /// are left out without one. The suite's `staticdata`, `exparch` and
    /// `iniexparch` must be set in the config.
    pub fn build(
        ctx: &TaskContext,
        config: Option<&Config>,
        resolved: Option<&ResolvedConfig>,
    ) -> Result<Self> {
        let mut env = Self::default();

        for (key, value) in ctx.ecf().client_env() {
            env.set(key, value);
        }
        let ecf_version = ctx
            .ecf()
            .version
            .as_deref()
            .or_else(|| config.and_then(|c| c.ecflow.version.as_deref()));
        if let Some(version) = ecf_version {
            env.set("ECF_VERSION", version);
        }
        env.set("ECUMASK", format!("{:03o}", TASK_UMASK));

        if let Some(tmpdir) = ctx.effective_tmpdir() {
            env.set("TMPDIR", tmpdir.display().to_string());
        }
        env.set("TROIKA_CPUS", ctx.ncpus().to_string());
        env.set("par_ncpus", ctx.ncpus().to_string());

        if let Some(resolved) = resolved {
            let (key, value) = resolved.env();
            env.set(key, value);
        }

        if let Some(config) = config {
            env.add_suite(config)?;
            env.add_toolchain(ctx, config);

            if let Some(run) = EnsembleRun::from_vars(ctx.vars(), &config.suite_workdir())? {
                for (key, value) in run.vars() {
                    env.set(key, value);
                }
            }
        }

        Ok(env)
    }

    fn add_suite(&mut self, config: &Config) -> Result<()> {
        let suite_dir = config.workroot.trim_end_matches('/').to_string();

        self.set("suite_dir", suite_dir);
        self.set("suite_libdir", config.suite_libdir());
        self.set("suite_workdir", config.suite_workdir());
        self.set("suite_staticdata", config.require("staticdata")?);
        self.set("suite_expver", config.expver.clone());
        self.set("suite_archdir", config.require("exparch")?);
        self.set("suite_iniarchdir", config.require("iniexparch")?);
        self.set("suite_era5_expver", config.era5_expver.clone());
        self.set(
            "suite_forecast_forcings_expver",
            config.forecast_forcings_expver.clone(),
        );
        self.set("suite_mode", config.mode.to_string());
        Ok(())
    }

    /// Conda environment and RAPID/PETSc toolchain.
    fn add_toolchain(&mut self, ctx: &TaskContext, config: &Config) {
        let suite_dir = config.workroot.trim_end_matches('/');
        let libdir = config.suite_libdir();
        let prefix = format!("{}/virtualenvs/{}", libdir, config.conda.env);

        self.set("CONDA_MODULE", config.conda.module.clone());
        self.set("CONDA_PREFIX", prefix.clone());
        self.set("CONDA_DEFAULT_ENV", config.conda.env.clone());
        self.set("GDAL_DATA", format!("{}/share/gdal", prefix));
        self.set("GDAL_DRIVER_PATH", format!("{}/lib/gdalplugins", prefix));
        self.set("PROJ_LIB", format!("{}/share/proj", prefix));

        let petsc_dir = format!("{}/petsc/{}", libdir, PETSC_VERSION);
        self.set("PETSC_DIR", petsc_dir.clone());
        self.set("PETSC_ARCH", PETSC_ARCH);

        if let Some(netcdf) = ctx.get("NETCDF4_DIR") {
            let lib = format!("{}/lib", netcdf);
            self.set("TACC_NETCDF_LIB", lib.clone());
            self.set("TACC_NETCDF_INC", format!("{}/include", netcdf));
            self.set("LD_LIBRARY_PATH", lib);
        }

        let mut path = vec![format!("{}/bin", suite_dir), format!("{}/bin", prefix)];
        if let Some(inherited) = ctx.get("PATH") {
            path.push(inherited.to_string());
        }
        path.push(format!("{}/{}/bin", petsc_dir, PETSC_ARCH));
        self.set("PATH", path.join(":"));
    }

    /// Set `key`, replacing an earlier value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// The environment as `export` lines for a POSIX shell.
    pub fn to_exports(&self) -> String {
        self.vars
            .iter()
            .map(|(k, v)| format!("export {}={}\n", k, shell_words::quote(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcfjobError;
    use crate::test_support::task_vars;
    use std::path::PathBuf;

    fn config() -> Config {
        Config::from_yaml(
            "workroot: /work/geoglows/\n\
             staticdata: /static/geoglows\n\
             expver: '0042'\n\
             exparch: ec:/geoglows/arch\n\
             iniexparch: ec:/geoglows/inits\n\
             mode: PROD\n",
        )
        .unwrap()
    }

    #[test]
    fn test_base_environment_without_config() {
        let ctx = TaskContext::from_vars(task_vars(&[
            ("TMPDIR", "/tmp/job"),
            ("SCRATCHDIR", "/scratch/job"),
            ("TROIKA_CPUS", "8"),
        ]))
        .unwrap();
        let env = TaskEnvironment::build(&ctx, None, None).unwrap();

        assert_eq!(env.get("ECF_NAME"), Some("/geoglows/forecast/run_rapid"));
        assert_eq!(env.get("ECUMASK"), Some("022"));
        assert_eq!(env.get("TMPDIR"), Some("/scratch/job"));
        assert_eq!(env.get("TROIKA_CPUS"), Some("8"));
        assert_eq!(env.get("par_ncpus"), Some("8"));
        assert_eq!(env.get("ECF_PASS"), None);
        assert_eq!(env.get("ECF_VERSION"), None);
        assert_eq!(env.get("suite_dir"), None);
        assert_eq!(env.get("CO_CONFIG_PATH"), None);
    }

    #[test]
    fn test_suite_variables() {
        let ctx = TaskContext::from_vars(task_vars(&[])).unwrap();
        let resolved = ResolvedConfig {
            path: PathBuf::from("/work/job/geoglows.yaml"),
            fetched: true,
        };
        let env = TaskEnvironment::build(&ctx, Some(&config()), Some(&resolved)).unwrap();

        assert_eq!(env.get("CO_CONFIG_PATH"), Some("/work/job/geoglows.yaml"));
        assert_eq!(env.get("suite_dir"), Some("/work/geoglows"));
        assert_eq!(env.get("suite_libdir"), Some("/work/geoglows/lib"));
        assert_eq!(env.get("suite_workdir"), Some("/work/geoglows/workdir"));
        assert_eq!(env.get("suite_staticdata"), Some("/static/geoglows"));
        assert_eq!(env.get("suite_expver"), Some("0042"));
        assert_eq!(env.get("suite_archdir"), Some("ec:/geoglows/arch"));
        assert_eq!(env.get("suite_iniarchdir"), Some("ec:/geoglows/inits"));
        assert_eq!(env.get("suite_era5_expver"), Some("0001"));
        assert_eq!(env.get("suite_mode"), Some("PROD"));
    }

    #[test]
    fn test_toolchain_variables() {
        let ctx = TaskContext::from_vars(task_vars(&[
            ("PATH", "/usr/bin:/bin"),
            ("NETCDF4_DIR", "/opt/netcdf4"),
        ]))
        .unwrap();
        let env = TaskEnvironment::build(&ctx, Some(&config()), None).unwrap();

        assert_eq!(env.get("CONDA_MODULE"), Some("conda/22.11.1-2"));
        assert_eq!(
            env.get("CONDA_PREFIX"),
            Some("/work/geoglows/lib/virtualenvs/rapid")
        );
        assert_eq!(
            env.get("GDAL_DATA"),
            Some("/work/geoglows/lib/virtualenvs/rapid/share/gdal")
        );
        assert_eq!(
            env.get("PROJ_LIB"),
            Some("/work/geoglows/lib/virtualenvs/rapid/share/proj")
        );
        assert_eq!(
            env.get("PETSC_DIR"),
            Some("/work/geoglows/lib/petsc/petsc-3.13.0")
        );
        assert_eq!(env.get("TACC_NETCDF_LIB"), Some("/opt/netcdf4/lib"));
        assert_eq!(env.get("TACC_NETCDF_INC"), Some("/opt/netcdf4/include"));
        assert_eq!(env.get("LD_LIBRARY_PATH"), Some("/opt/netcdf4/lib"));
        assert_eq!(
            env.get("PATH"),
            Some(
                "/work/geoglows/bin:/work/geoglows/lib/virtualenvs/rapid/bin:/usr/bin:/bin:\
                 /work/geoglows/lib/petsc/petsc-3.13.0/linux-gcc-c/bin"
            )
        );
    }

    #[test]
    fn test_netcdf_left_out_when_unset() {
        let ctx = TaskContext::from_vars(task_vars(&[])).unwrap();
        let env = TaskEnvironment::build(&ctx, Some(&config()), None).unwrap();

        assert_eq!(env.get("TACC_NETCDF_LIB"), None);
        assert_eq!(env.get("LD_LIBRARY_PATH"), None);
    }

    #[test]
    fn test_forecast_variables() {
        let ctx = TaskContext::from_vars(task_vars(&[("YMD", "20240615"), ("MEMBERS", "2")]))
            .unwrap();
        let env = TaskEnvironment::build(&ctx, Some(&config()), None).unwrap();

        assert_eq!(env.get("ens_ymd"), Some("20240615"));
        assert_eq!(
            env.get("ens_fcdir"),
            Some("/work/geoglows/workdir/fc/2024061500")
        );
        assert_eq!(env.get("ens_members"), Some("00 01"));
    }

    #[test]
    fn test_invalid_forecast_date_is_error() {
        let ctx = TaskContext::from_vars(task_vars(&[("YMD", "2024-06-15")])).unwrap();
        assert!(TaskEnvironment::build(&ctx, Some(&config()), None).is_err());
    }

    #[test]
    fn test_missing_suite_paths_are_config_errors() {
        let ctx = TaskContext::from_vars(task_vars(&[])).unwrap();
        let config = Config::from_yaml(
            "workroot: /work/geoglows\nexparch: ec:/a\niniexparch: ec:/b\n",
        )
        .unwrap();

        let err = TaskEnvironment::build(&ctx, Some(&config), None).unwrap_err();

        assert!(matches!(err, EcfjobError::ConfigError(_)));
        assert!(err.to_string().contains("'staticdata' is not defined"));
    }

    #[test]
    fn test_ecf_version_from_task_then_config() {
        let config = Config::from_yaml(
            "workroot: /work/geoglows\n\
             staticdata: /static\n\
             exparch: ec:/a\n\
             iniexparch: ec:/b\n\
             ecflow:\n  version: 5.11.4\n",
        )
        .unwrap();

        let ctx = TaskContext::from_vars(task_vars(&[])).unwrap();
        let env = TaskEnvironment::build(&ctx, Some(&config), None).unwrap();
        assert_eq!(env.get("ECF_VERSION"), Some("5.11.4"));

        let ctx = TaskContext::from_vars(task_vars(&[("ECF_VERSION", "5.12.0")])).unwrap();
        let env = TaskEnvironment::build(&ctx, Some(&config), None).unwrap();
        assert_eq!(env.get("ECF_VERSION"), Some("5.12.0"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut env = TaskEnvironment::default();
        env.set("A", "1");
        env.set("B", "2");
        env.set("A", "3");

        assert_eq!(
            env.vars(),
            &[
                ("A".to_string(), "3".to_string()),
                ("B".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_exports_are_quoted() {
        let mut env = TaskEnvironment::default();
        env.set("ens_members", "00 01");
        env.set("suite_mode", "TEST");

        assert_eq!(
            env.to_exports(),
            "export ens_members='00 01'\nexport suite_mode=TEST\n"
        );
    }
}
