// Collaborator contracts live in `traits`; every other module is one Linux implementation.

pub mod traits;     // Global contracts
pub mod command;    // Process execution
pub mod apt;        // Package installation (dpkg / apt-get)
pub mod files;      // Idempotent files & symlinks
pub mod templates;  // Site templates (minijinja)
pub mod systemd;    // Service reconciliation
pub mod acme;       // Certificate management (acmetool)

// 🏗️ Re-exports so deploy.rs and main.rs don't need deep nested imports.
pub use traits::{
    CertificateProvisioner, FileSync, Ownership, PackageManager, ReloadHook, ServiceActions, ServiceController,
    ServiceState, SiteTemplate, TemplateRenderer,
};
