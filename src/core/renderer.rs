use anyhow::{Context as _, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use tera::Context;
use tracing::{info, warn};

use crate::config::{Config, HostRecord, Role};
use crate::core::workspace::Workspace;
use crate::utils::fs::write_file;
use crate::utils::keys::Keypair;
use crate::utils::TemplateEngine;

const AUTO_SETUP_TEMPLATE: &str = "auto_setup.tera";
const BOOT_MENU_TEMPLATE: &str = "isolinux.cfg.tera";
const KICKSTART_TEMPLATE: &str = "ks.cfg.tera";

/// Where rendered automation payloads land inside the working tree.
const AUTOMATION_DIR: &str = "SecurityOnion/setup/automation";

/// Binds the configuration (and keypair, when requested) to the template
/// set and materializes every provisioning artifact into the workspace.
pub struct ProvisioningRenderer {
    engine: TemplateEngine,
    partition_tables_dir: PathBuf,
    keypair: Option<Keypair>,
}

impl ProvisioningRenderer {
    pub fn new(templates_dir: &Path, partition_tables_dir: &Path) -> Result<Self> {
        Ok(Self {
            engine: TemplateEngine::from_dir(templates_dir)?,
            partition_tables_dir: partition_tables_dir.to_path_buf(),
            keypair: None,
        })
    }

    /// Render every artifact for this configuration into the workspace.
    pub async fn render_all(&mut self, config: &Config, workspace: &Workspace) -> Result<()> {
        if config.inject_ssh_keys {
            self.ensure_keypair(workspace.keys_dir()).await?;
        }

        let mut globals = Context::new();
        globals.insert("config", config);
        if let Some(keys) = &self.keypair {
            globals.insert("keys", keys);
        }

        // The base-install payload is embedded as a parameter inside later
        // renders, so it travels base64-encoded.
        info!("Rendering auto_setup");
        let auto_setup = self.engine.render(AUTO_SETUP_TEMPLATE, &globals)?;
        globals.insert("auto_setup", &STANDARD.encode(auto_setup));
        info!("Done with auto_setup");

        info!("Rendering isolinux.cfg");
        self.engine.render_to_file(
            BOOT_MENU_TEMPLATE,
            &globals,
            &workspace.working_dir().join("isolinux.cfg"),
        )?;
        info!("Done with isolinux.cfg");

        for role in Role::ALL {
            for host in config.hosts(role) {
                self.render_host(role, host, &globals, workspace)?;
            }
        }

        Ok(())
    }

    /// Generate the keypair on first use; later calls within the same build
    /// are no-ops.
    async fn ensure_keypair(&mut self, keys_dir: &Path) -> Result<()> {
        if self.keypair.is_none() {
            let keypair = Keypair::generate(keys_dir)
                .await
                .context("Failed to generate ssh keypair")?;
            self.keypair = Some(keypair);
        }
        Ok(())
    }

    fn render_host(
        &self,
        role: Role,
        host: &HostRecord,
        globals: &Context,
        workspace: &Workspace,
    ) -> Result<()> {
        info!("Rendering {} kickstart", host.hostname);

        let mut context = globals.clone();
        for (key, value) in &host.fields {
            context.insert(key.as_str(), value);
        }
        context.insert("hostname", &host.hostname);
        context.insert("install_type", role.as_str());
        if let Some(content) = self.partition_table_for(host) {
            context.insert("custom_part_table", &content);
        }

        let kickstart = self
            .engine
            .render(KICKSTART_TEMPLATE, &context)
            .with_context(|| format!("Failed to render kickstart for {}", host.hostname))?;

        // The early-boot environment reads from the boot-archive tree, the
        // installed system from the disc tree; both carry the same file and
        // both writes complete before the next host starts.
        let file_name = format!("ks_{}.cfg", host.hostname);
        for dir in [workspace.initrd_dir(), workspace.working_dir()] {
            write_file(&dir.join(&file_name), kickstart.as_bytes())?;
        }

        info!("Rendering {} answer file", host.hostname);
        let automation = self
            .engine
            .render(&format!("{}.tera", role.as_str()), &context)
            .with_context(|| {
                format!("Failed to render {} answer file for {}", role, host.hostname)
            })?;
        write_file(
            &workspace
                .working_dir()
                .join(AUTOMATION_DIR)
                .join(&host.hostname),
            automation.as_bytes(),
        )?;

        info!("Done with {}", host.hostname);
        Ok(())
    }

    /// Resolve a host's partition-table reference to file content. A missing
    /// file is recoverable: the binding is dropped and the kickstart
    /// template falls back to its default layout.
    fn partition_table_for(&self, host: &HostRecord) -> Option<String> {
        let name = host.custom_part_table.as_deref()?;
        let path = self.partition_tables_dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(_) => {
                warn!("No partition table found at {}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostRecord;

    fn write_template_set(dir: &Path) {
        std::fs::write(
            dir.join(AUTO_SETUP_TEMPLATE),
            "automated={{ config.inject_ssh_keys }}",
        )
        .unwrap();
        std::fs::write(
            dir.join(BOOT_MENU_TEMPLATE),
            "default install\npayload={{ auto_setup }}\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(KICKSTART_TEMPLATE),
            concat!(
                "hostname={{ hostname }}\n",
                "role={{ install_type }}\n",
                "{% if custom_part_table %}{{ custom_part_table }}{% else %}autopart{% endif %}\n",
                "{% if keys %}pubkey={{ keys.public_key }}{% endif %}",
            ),
        )
        .unwrap();
        for role in ["manager", "search", "sensor"] {
            std::fs::write(
                dir.join(format!("{role}.tera")),
                "{{ install_type }} {{ hostname }}\n",
            )
            .unwrap();
        }
    }

    fn host(hostname: &str) -> HostRecord {
        HostRecord {
            hostname: hostname.to_string(),
            custom_part_table: None,
            fields: Default::default(),
        }
    }

    struct Fixture {
        templates: tempfile::TempDir,
        partition_tables: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let templates = tempfile::tempdir().unwrap();
            write_template_set(templates.path());
            Self {
                templates,
                partition_tables: tempfile::tempdir().unwrap(),
            }
        }

        fn renderer(&self) -> ProvisioningRenderer {
            ProvisioningRenderer::new(self.templates.path(), self.partition_tables.path())
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_one_kickstart_per_host_in_both_trees() {
        let fixture = Fixture::new();
        let workspace = Workspace::allocate().unwrap();
        let config = Config {
            manager: vec![host("mgr1")],
            search: vec![host("search1")],
            sensor: vec![host("sensor1")],
            ..Default::default()
        };

        fixture.renderer().render_all(&config, &workspace).await.unwrap();

        for name in ["mgr1", "search1", "sensor1"] {
            let file_name = format!("ks_{name}.cfg");
            let in_initrd = workspace.initrd_dir().join(&file_name);
            let in_working = workspace.working_dir().join(&file_name);
            assert!(in_initrd.is_file());
            assert!(in_working.is_file());
            assert_eq!(
                std::fs::read(&in_initrd).unwrap(),
                std::fs::read(&in_working).unwrap()
            );
        }

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_role_tag_reaches_templates() {
        let fixture = Fixture::new();
        let workspace = Workspace::allocate().unwrap();
        let config = Config {
            sensor: vec![host("sensor1")],
            ..Default::default()
        };

        fixture.renderer().render_all(&config, &workspace).await.unwrap();

        let kickstart = std::fs::read_to_string(
            workspace.working_dir().join("ks_sensor1.cfg"),
        )
        .unwrap();
        assert!(kickstart.contains("role=sensor"));

        let answer = std::fs::read_to_string(
            workspace
                .working_dir()
                .join(AUTOMATION_DIR)
                .join("sensor1"),
        )
        .unwrap();
        assert_eq!(answer, "sensor sensor1\n");

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_boot_menu_embeds_base64_auto_setup() {
        let fixture = Fixture::new();
        let workspace = Workspace::allocate().unwrap();
        let config = Config {
            manager: vec![host("mgr1")],
            ..Default::default()
        };

        fixture.renderer().render_all(&config, &workspace).await.unwrap();

        let boot_menu = std::fs::read_to_string(
            workspace.working_dir().join("isolinux.cfg"),
        )
        .unwrap();
        let encoded = boot_menu
            .lines()
            .find_map(|line| line.strip_prefix("payload="))
            .unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, b"automated=false");

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_missing_partition_table_falls_back() {
        let fixture = Fixture::new();
        let workspace = Workspace::allocate().unwrap();
        let mut record = host("sensor1");
        record.custom_part_table = Some("missing.txt".to_string());
        let config = Config {
            sensor: vec![record],
            ..Default::default()
        };

        fixture.renderer().render_all(&config, &workspace).await.unwrap();

        let kickstart = std::fs::read_to_string(
            workspace.working_dir().join("ks_sensor1.cfg"),
        )
        .unwrap();
        assert!(kickstart.contains("autopart"));
        assert!(!kickstart.contains("missing.txt"));

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_partition_table_content_is_inlined() {
        let fixture = Fixture::new();
        std::fs::write(
            fixture.partition_tables.path().join("nvme.txt"),
            "part / --size=8192",
        )
        .unwrap();
        let workspace = Workspace::allocate().unwrap();
        let mut record = host("sensor1");
        record.custom_part_table = Some("nvme.txt".to_string());
        let config = Config {
            sensor: vec![record],
            ..Default::default()
        };

        fixture.renderer().render_all(&config, &workspace).await.unwrap();

        let kickstart = std::fs::read_to_string(
            workspace.working_dir().join("ks_sensor1.cfg"),
        )
        .unwrap();
        assert!(kickstart.contains("part / --size=8192"));
        assert!(!kickstart.contains("autopart"));

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_no_key_material_when_injection_disabled() {
        let fixture = Fixture::new();
        let workspace = Workspace::allocate().unwrap();
        let config = Config {
            manager: vec![host("mgr1")],
            ..Default::default()
        };

        let mut renderer = fixture.renderer();
        renderer.render_all(&config, &workspace).await.unwrap();

        assert!(renderer.keypair.is_none());
        let kickstart = std::fs::read_to_string(
            workspace.working_dir().join("ks_mgr1.cfg"),
        )
        .unwrap();
        assert!(!kickstart.contains("pubkey="));

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_host_fields_are_exposed_to_templates() {
        let templates = tempfile::tempdir().unwrap();
        write_template_set(templates.path());
        std::fs::write(
            templates.path().join(KICKSTART_TEMPLATE),
            "address={{ address }}\n",
        )
        .unwrap();
        let partition_tables = tempfile::tempdir().unwrap();
        let workspace = Workspace::allocate().unwrap();

        let mut record = host("mgr1");
        record.fields.insert(
            "address".to_string(),
            serde_yaml::Value::String("10.0.0.2".to_string()),
        );
        let config = Config {
            manager: vec![record],
            ..Default::default()
        };

        ProvisioningRenderer::new(templates.path(), partition_tables.path())
            .unwrap()
            .render_all(&config, &workspace)
            .await
            .unwrap();

        let kickstart = std::fs::read_to_string(
            workspace.working_dir().join("ks_mgr1.cfg"),
        )
        .unwrap();
        assert_eq!(kickstart, "address=10.0.0.2\n");

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_keypair_generated_at_most_once() {
        let fixture = Fixture::new();
        let mut renderer = fixture.renderer();
        renderer.keypair = Some(Keypair {
            public_key: "ssh-rsa AAAA existing".to_string(),
            private_key: "ZXhpc3Rpbmc=".to_string(),
        });

        // Already provisioned: no external tool runs, nothing is replaced.
        renderer
            .ensure_keypair(Path::new("/nonexistent/keys"))
            .await
            .unwrap();
        assert_eq!(
            renderer.keypair.as_ref().unwrap().public_key,
            "ssh-rsa AAAA existing"
        );
    }

    #[tokio::test]
    async fn test_host_render_error_aborts() {
        let templates = tempfile::tempdir().unwrap();
        write_template_set(templates.path());
        // A kickstart that requires a binding no host provides.
        std::fs::write(
            templates.path().join(KICKSTART_TEMPLATE),
            "{{ undefined_binding }}",
        )
        .unwrap();
        let partition_tables = tempfile::tempdir().unwrap();
        let workspace = Workspace::allocate().unwrap();
        let config = Config {
            manager: vec![host("mgr1")],
            ..Default::default()
        };

        let result = ProvisioningRenderer::new(templates.path(), partition_tables.path())
            .unwrap()
            .render_all(&config, &workspace)
            .await;
        assert!(result.is_err());

        workspace.teardown().await;
    }
}
