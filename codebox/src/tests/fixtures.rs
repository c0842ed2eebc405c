/// Test code samples for different languages
pub mod code_samples {
    pub const PYTHON_HELLO: &str = r#"print("Hello, World!")"#;
    pub const JS_HELLO: &str = r#"console.log("Hello, World!");"#;
    pub const TS_HELLO: &str = r#"const message: string = "Hello, World!";
console.log(message);"#;
    pub const SHELL_HELLO: &str = r#"echo "Hello, World!""#;
}

/// Programs that fail in the runtime itself
pub mod runtime_errors {
    pub const PYTHON_NAME_ERROR: &str = r#"print(undefined_symbol)"#;
    pub const JS_REFERENCE_ERROR: &str = r#"console.log(undefinedSymbol);"#;
    pub const SHELL_EXIT_CODE: &str = r#"echo "partial output"
echo "something went wrong" >&2
exit 3"#;
}

/// Test code samples for specific scenarios
pub mod test_scenarios {
    pub const PYTHON_SLEEP: &str = r#"import time
time.sleep(10)
print("finished")"#;

    pub const PYTHON_IGNORES_SIGTERM: &str = r#"import signal, time
signal.signal(signal.SIGTERM, signal.SIG_IGN)
print("ready", flush=True)
time.sleep(10)"#;

    pub const JS_SLEEP: &str = r#"setTimeout(() => {
    console.log("finished");
}, 10000);"#;

    pub const SHELL_SLEEP: &str = r#"sleep 10
echo finished"#;

    pub const PYTHON_ENV: &str = r#"import os
print(os.environ.get("CODEBOX_GREETING"))
print("CODEBOX_NEVER_SET" in os.environ)"#;

    pub const JS_ENV: &str = r#"console.log(process.env.CODEBOX_GREETING);"#;

    pub const SHELL_ENV: &str = r#"echo "$CODEBOX_GREETING""#;

    pub const PYTHON_LIST_DIR: &str = r#"import os
print(sorted(os.listdir(".")))"#;

    pub const PYTHON_LARGE_OUTPUT: &str = r#"print("x" * 100000)"#;

    pub const PYTHON_ALLOCATE_1GB: &str = r#"data = bytearray(1024 * 1024 * 1024)
print(len(data))"#;

    pub const PYTHON_FORK: &str = r#"import os
pid = os.fork()
if pid == 0:
    os._exit(0)
os.waitpid(pid, 0)
print("forked")"#;

    pub const PYTHON_WRITE_FILE: &str = r#"with open("out.txt", "w") as f:
    f.write("data")
print("written")"#;

    /// Leaves a background child in the group and records its pid.
    pub const SHELL_BACKGROUND_CHILD: &str = r#"sleep 30 &
echo $! > child.pid
wait"#;

    pub const PYTHON_WITH_DEPS: &str = r#"import six
print(f"six {six.__version__}")"#;

    pub const JS_WITH_DEPS: &str = r#"const _ = require('lodash');
console.log(_.capitalize('hello world'));"#;
}
