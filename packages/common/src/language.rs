use serde::Serialize;

/// A programming language (compiler or interpreter) submissions can use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Language {
    pub id: &'static str,
    pub display_name: &'static str,
    pub monaco_id: &'static str,
    pub code_filename: &'static str,
    pub compile_cmd: Option<&'static str>,
    pub compiled_filename: Option<&'static str>,
    pub execute_cmd: &'static str,
    /// Disabled languages are listed for old submissions but cannot be used
    /// for new ones.
    pub enabled: bool,
}

const LANGUAGES: &[Language] = &[
    Language {
        id: "python3.10",
        display_name: "Python 3.10",
        monaco_id: "python",
        code_filename: "main.py",
        compile_cmd: None,
        compiled_filename: None,
        execute_cmd: "python3.10 main.py",
        enabled: false,
    },
    Language {
        id: "python3.11",
        display_name: "Python 3.11",
        monaco_id: "python",
        code_filename: "main.py",
        compile_cmd: None,
        compiled_filename: None,
        execute_cmd: "python3.11 main.py",
        enabled: true,
    },
    Language {
        id: "go1.21",
        display_name: "Go 1.21",
        monaco_id: "go",
        code_filename: "main.go",
        compile_cmd: Some("go build main.go"),
        compiled_filename: Some("main"),
        execute_cmd: "./main",
        enabled: true,
    },
    Language {
        id: "java21",
        display_name: "Java SE 21",
        monaco_id: "java",
        code_filename: "Main.java",
        compile_cmd: Some("javac Main.java"),
        compiled_filename: Some("Main.class"),
        execute_cmd: "java -Xss64M -Xmx1024M -Xms8M -XX:+UseSerialGC Main",
        enabled: true,
    },
    Language {
        id: "cpp17",
        display_name: "C++17 (GCC)",
        monaco_id: "cpp",
        code_filename: "main.cpp",
        compile_cmd: Some("g++ -std=c++17 -O2 -o main main.cpp"),
        compiled_filename: Some("main"),
        execute_cmd: "./main",
        enabled: true,
    },
];

/// All known languages, enabled or not.
pub fn all() -> &'static [Language] {
    LANGUAGES
}

/// Look up an enabled language by id.
pub fn find_enabled(id: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.enabled && l.id == id)
}
