// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Connection Capabilities
// Generic connection surface; each connection type opts into what it supports

use std::fmt;

use async_trait::async_trait;

use jump_tunnel_common::{Error, LocalBinding, Operation, RemoteEndpoint, Result};

/// Command line for remote process operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdLine {
    arguments: Vec<String>,
}

impl CmdLine {
    pub fn build<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_argument(&mut self, argument: impl Into<String>) -> &mut Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

impl fmt::Display for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arguments.join(" "))
    }
}

/// A file on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub temporary: bool,
}

/// A process started on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProcess {
    pub command: CmdLine,
}

/// Maps endpoints only reachable remotely onto local addresses
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, remote: &RemoteEndpoint) -> Result<LocalBinding>;
}

/// A connection to a remote host
///
/// File and process operations are refused unless a connection type
/// overrides them.
#[async_trait]
pub trait Connection: Send + Sync {
    fn protocol(&self) -> &str;

    async fn close(&self);

    fn address_resolver(&self) -> Option<&dyn AddressResolver> {
        None
    }

    fn get_file(&self, _host_path: &str, _temporary: bool) -> Result<RemoteFile> {
        Err(Error::Unsupported(Operation::GetFile))
    }

    fn get_child_file(
        &self,
        _parent: &RemoteFile,
        _child: &str,
        _temporary: bool,
    ) -> Result<RemoteFile> {
        Err(Error::Unsupported(Operation::GetChildFile))
    }

    async fn start_process(&self, _command: &CmdLine) -> Result<RemoteProcess> {
        Err(Error::Unsupported(Operation::StartProcess))
    }

    /// Run a command to completion, returning its exit code
    async fn execute(&self, _command: &CmdLine) -> Result<i32> {
        Err(Error::Unsupported(Operation::Execute))
    }

    fn working_directory(&self) -> Result<RemoteFile> {
        Err(Error::Unsupported(Operation::GetWorkingDirectory))
    }

    fn set_working_directory(&self, _directory: RemoteFile) -> Result<()> {
        Err(Error::Unsupported(Operation::SetWorkingDirectory))
    }

    fn process_command_line(&self, _command: &CmdLine) -> Result<CmdLine> {
        Err(Error::Unsupported(Operation::ProcessCommandLine))
    }

    fn add_command_separator(&self, _command: &mut CmdLine) -> Result<()> {
        Err(Error::Unsupported(Operation::AddCommandSeparator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdline_display() {
        let mut cmd = CmdLine::build(["ls", "-l"]);
        cmd.add_argument("/tmp");
        assert_eq!(cmd.arguments().len(), 3);
        assert_eq!(cmd.to_string(), "ls -l /tmp");
    }
}
