// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The `qXfer:memory-map:read::` XML document GDB uses to tell its
//! flash-aware commands (`load`, software breakpoints over flash)
//! where the writable flash region sits and how it is erased.

use rv003dbg_flash::regs::{FLASH_BASE, FLASH_SIZE, PAGE_SIZE};
use rv003dbg_target::{RAM_BASE, RAM_SIZE};

/// Rendered once at startup; addresses are this chip family's fixed
/// layout, so there is nothing to compute at runtime.
pub const MEMORY_MAP_XML: &str = concat!(
    "<?xml version=\"1.0\"?>\n",
    "<!DOCTYPE memory-map PUBLIC \"+//IDN gnu.org//DTD GDB Memory Map V1.0//EN\" \"http://sourceware.org/gdb/gdb-memory-map.dtd\">\n",
    "<memory-map>\n",
    "  <memory type=\"flash\" start=\"0x08000000\" length=\"0x4000\">\n",
    "    <property name=\"blocksize\">0x40</property>\n",
    "  </memory>\n",
    "  <memory type=\"ram\" start=\"0x20000000\" length=\"0x800\"/>\n",
    "</memory-map>\n",
);
