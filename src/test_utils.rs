//! Fixtures shared by unit tests.

#[cfg(test)]
pub mod fixtures {
    use crate::error::{Result, VcsError};
    use crate::process::{Invocation, ProcessRunner};
    use std::sync::Mutex;

    enum Reply {
        Output(Vec<u8>),
        Failure(String),
    }

    /// Process runner answering from a script instead of spawning tools.
    ///
    /// Rules match when the command line contains their pattern; the most
    /// recently added matching rule wins. Unmatched commands succeed with
    /// empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<(String, Reply)>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn respond(&self, pattern: &str, output: &str) {
            self.rules
                .lock()
                .unwrap()
                .push((pattern.to_string(), Reply::Output(output.as_bytes().to_vec())));
        }

        pub fn fail(&self, pattern: &str, stderr: &str) {
            self.rules
                .lock()
                .unwrap()
                .push((pattern.to_string(), Reply::Failure(stderr.to_string())));
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, pattern: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| call.command_line().contains(pattern))
                .count()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(invocation.clone());
            let line = invocation.command_line();
            let rules = self.rules.lock().unwrap();
            match rules.iter().rev().find(|(pattern, _)| line.contains(pattern.as_str())) {
                Some((_, Reply::Output(output))) => Ok(output.clone()),
                Some((_, Reply::Failure(stderr))) => Err(VcsError::ExternalTool {
                    command: line,
                    cwd: invocation.cwd.clone(),
                    code: Some(1),
                    detail: stderr.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }
}
