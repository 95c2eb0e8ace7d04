//! Application-wide constants
//!
//! Well-known paths, process names and Xorg literals used by the mode
//! switcher, kept in one place so the collaborators and the tests agree.

/// Filesystem locations
pub mod paths {
    /// Generated Xorg configuration (owned by this tool)
    pub const XORG_CONF: &str = "/etc/X11/xorg.conf.d/10-prime-switch.conf";

    /// Hand-written or distribution configs that take precedence over ours
    pub const OVERRIDING_XORG_CONFS: &[&str] =
        &["/etc/X11/xorg.conf", "/etc/X11/xorg.conf.d/90-mhwd.conf"];

    /// User option file
    pub const CONFIG_FILE: &str = "/etc/prime-switch/prime-switch.toml";

    /// Directory holding `<device>.conf` files with extra raw Xorg lines
    pub const EXTRA_XORG_DIR: &str = "/etc/prime-switch/xorg";

    /// Directory holding the per-mode `xsetup-<mode>.sh` hooks
    pub const XSETUP_DIR: &str = "/etc/prime-switch";

    /// Persisted requested/applied mode and last error
    pub const STATE_DIR: &str = "/var/lib/prime-switch";

    /// Kernel command line
    pub const PROC_CMDLINE: &str = "/proc/cmdline";

    /// Currently loaded kernel modules
    pub const PROC_MODULES: &str = "/proc/modules";

    /// Name of PID 1, used to detect the init system
    pub const PROC_INIT_COMM: &str = "/proc/1/comm";

    /// Power supplies exposed by the kernel
    pub const POWER_SUPPLY: &str = "/sys/class/power_supply";

    /// PCI devices exposed by the kernel
    pub const PCI_DEVICES: &str = "/sys/bus/pci/devices";

    /// Xorg DDX driver modules
    pub const XORG_DRIVERS: &str = "/usr/lib/xorg/modules/drivers";

    /// Present when elogind replaces systemd-logind
    pub const ELOGIND_LIB: &str = "/usr/lib/libelogind.so.0";

    /// Present on Artix runit installs (Void keeps services elsewhere)
    pub const RUNIT_ARTIX_SERVICES: &str = "/run/runit/service";
}

/// Display server process detection
pub mod processes {
    /// Binary names of a running X server
    pub const XORG_NAMES: &[&str] = &["Xorg", "X"];

    /// Service account the login manager starts its greeter X server as
    pub const LOGIN_MANAGER_USER: &str = "gdm";
}

/// Service names queried through the service probe
pub mod services {
    pub const DISPLAY_MANAGER: &str = "display-manager";
}

/// Xorg configuration literals
pub mod xorg {
    /// Module search paths emitted in the `Files` section, in order
    pub const MODULE_PATHS: &[&str] = &[
        "/usr/lib/nvidia",
        "/usr/lib32/nvidia",
        "/usr/lib32/nvidia/xorg/modules",
        "/usr/lib32/xorg/modules",
        "/usr/lib64/nvidia/xorg/modules",
        "/usr/lib64/nvidia/xorg",
        "/usr/lib64/xorg/modules",
    ];

    /// Generic KMS driver every integrated GPU falls back to
    pub const MODESETTING_DRIVER: &str = "modesetting";

    /// Layout identifier shared by discrete and hybrid documents
    pub const LAYOUT_IDENTIFIER: &str = "layout";
}

/// RandR provider names
pub mod offload {
    /// Output sink of the NVIDIA driver in discrete mode
    pub const NVIDIA_SINK: &str = "NVIDIA-0";

    /// Offload provider advertised when PRIME render offload is usable
    pub const NVIDIA_OFFLOAD_PROVIDER: &str = "NVIDIA-G0";

    /// Vendor substrings identifying the integrated provider
    pub const INTEGRATED_PROVIDER_MARKERS: &[&str] = &["Intel", "AMD"];

    /// glxinfo vendor line when NVIDIA renders the default GL context
    pub const NVIDIA_GLX_VENDOR: &str = "server glx vendor string: NVIDIA Corporation";
}

/// PCI identification
pub mod pci {
    /// Display controller base class (VGA, 3D, other display)
    pub const DISPLAY_CLASS_PREFIX: &str = "0x03";

    pub const VENDOR_NVIDIA: &str = "0x10de";
    pub const VENDOR_INTEL: &str = "0x8086";
    pub const VENDOR_AMD: &str = "0x1002";
}

/// Kernel modules handled by the modprobe collaborator
pub mod kernel {
    /// Load order; unloading walks this list backwards
    pub const NVIDIA_MODULES: &[&str] =
        &["nvidia", "nvidia_modeset", "nvidia_uvm", "nvidia_drm"];

    /// Loading this pulls in the rest of the stack
    pub const NVIDIA_DRM_MODULE: &str = "nvidia_drm";

    /// Command line parameter selecting the startup mode
    pub const STARTUP_PARAM: &str = "prime-switch.startup";
}
