//! `bytecode_dump <file.lua>` — compiles a chunk and prints its `Prototype`
//! tree: header, param/slot/upvalue/constant/child counts, then every
//! instruction with its decoded operands. Mirrors the teacher's own
//! `bytecode_dump` binary, adapted to this VM's iABC/iABx/iAsBx 5.1-style
//! encoding rather than the teacher's 5.4 vABCk one.

use std::env;
use std::fs;
use std::rc::Rc;

use fenlua::value::Value;
use fenlua::vm::opcode::{Instruction, OpCode};
use fenlua::vm::prototype::Prototype;
use fenlua::vm::state::LuaState;

fn main() {
    let args: Vec<String> = env::args().collect();

    let (source, filename) = if args.len() > 1 {
        let filename = args[1].clone();
        match fs::read_to_string(&filename) {
            Ok(content) => (content, filename),
            Err(e) => {
                eprintln!("Error reading file '{}': {}", filename, e);
                std::process::exit(1);
            }
        }
    } else {
        println!("Usage: bytecode_dump <source_file.lua>");
        std::process::exit(0);
    };

    let state = LuaState::new();
    let chunk_name = format!("@{}", filename);

    match fenlua::compiler::compile_chunk(&state, &source, &chunk_name) {
        Ok(fenlua::value::Function::Lua(data)) => {
            dump_proto(&data.proto, true);
        }
        Ok(fenlua::value::Function::Native(_)) => {
            eprintln!("bytecode_dump: compiled chunk was not a Lua closure");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn format_constant(val: &Value) -> String {
    match val {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let content = s.as_str();
            let mut escaped = String::new();
            for ch in content.chars() {
                match ch {
                    '\\' => escaped.push_str("\\\\"),
                    '\n' => escaped.push_str("\\n"),
                    '\r' => escaped.push_str("\\r"),
                    '\t' => escaped.push_str("\\t"),
                    '"' => escaped.push_str("\\\""),
                    '\0' => escaped.push_str("\\000"),
                    c if c.is_control() => escaped.push_str(&format!("\\{:03}", c as u8)),
                    c => escaped.push(c),
                }
            }
            let char_count = escaped.chars().count();
            if char_count > 64 {
                let truncated: String = escaped.chars().take(64).collect();
                format!("\"{} ...\"", truncated)
            } else {
                format!("\"{}\"", escaped)
            }
        }
        other => format!("{:?}", other.type_name()),
    }
}

fn disasm(instr: Instruction) -> String {
    let op = instr.op();
    let a = instr.a();
    let b = instr.b();
    let c = instr.c();
    let bx = instr.bx();
    let sbx = instr.sbx();

    match op {
        OpCode::Move => format!("MOVE      {} {}", a, b),
        OpCode::LoadK => format!("LOADK     {} {}", a, bx),
        OpCode::LoadKX => format!("LOADKX    {}", a),
        OpCode::LoadNil => format!("LOADNIL   {} {}", a, b),
        OpCode::LoadBool => format!("LOADBOOL  {} {} {}", a, b, c),
        OpCode::GetGlobal => format!("GETGLOBAL {} {}", a, bx),
        OpCode::SetGlobal => format!("SETGLOBAL {} {}", a, bx),
        OpCode::GetUpval => format!("GETUPVAL  {} {}", a, b),
        OpCode::SetUpval => format!("SETUPVAL  {} {}", a, b),
        OpCode::NewTable => format!("NEWTABLE  {} {} {}", a, b, c),
        OpCode::GetTable => format!("GETTABLE  {} {} {}", a, b, c),
        OpCode::SetTable => format!("SETTABLE  {} {} {}", a, b, c),
        OpCode::SelfOp => format!("SELF      {} {} {}", a, b, c),
        OpCode::Add => format!("ADD       {} {} {}", a, b, c),
        OpCode::Sub => format!("SUB       {} {} {}", a, b, c),
        OpCode::Mul => format!("MUL       {} {} {}", a, b, c),
        OpCode::Div => format!("DIV       {} {} {}", a, b, c),
        OpCode::Mod => format!("MOD       {} {} {}", a, b, c),
        OpCode::Pow => format!("POW       {} {} {}", a, b, c),
        OpCode::Unm => format!("UNM       {} {}", a, b),
        OpCode::Not => format!("NOT       {} {}", a, b),
        OpCode::Len => format!("LEN       {} {}", a, b),
        OpCode::Concat => format!("CONCAT    {} {} {}", a, b, c),
        OpCode::Eq => format!("EQ        {} {} {}", a, b, c),
        OpCode::Lt => format!("LT        {} {} {}", a, b, c),
        OpCode::Le => format!("LE        {} {} {}", a, b, c),
        OpCode::Jmp => format!("JMP       {}", sbx),
        OpCode::Test => format!("TEST      {} {}", a, c),
        OpCode::TestSet => format!("TESTSET   {} {} {}", a, b, c),
        OpCode::Call => format!("CALL      {} {} {}", a, b, c),
        OpCode::TailCall => format!("TAILCALL  {} {} {}", a, b, c),
        OpCode::Return => format!("RETURN    {} {}", a, b),
        OpCode::Vararg => format!("VARARG    {} {}", a, b),
        OpCode::Closure => format!("CLOSURE   {} {}", a, bx),
        OpCode::Close => format!("CLOSE     {}", a),
        OpCode::ForPrep => format!("FORPREP   {} {}", a, sbx),
        OpCode::ForLoop => format!("FORLOOP   {} {}", a, sbx),
        OpCode::TForLoop => format!("TFORLOOP  {} {}", a, c),
    }
}

fn comment_for(instr: Instruction, proto: &Prototype) -> String {
    let op = instr.op();
    let bx = instr.bx() as usize;
    match op {
        OpCode::LoadK => proto
            .constants
            .get(bx)
            .map(|v| format!(" ; {}", format_constant(v)))
            .unwrap_or_default(),
        OpCode::GetGlobal | OpCode::SetGlobal => proto
            .constants
            .get(bx)
            .map(|v| format!(" ; _G {}", format_constant(v)))
            .unwrap_or_default(),
        OpCode::Closure => proto
            .children
            .get(bx)
            .map(|child| format!(" ; {}", child.debug_name))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn dump_proto(proto: &Rc<Prototype>, is_main: bool) {
    let header = if is_main {
        format!("main <{}:0>", proto.source_name)
    } else {
        format!("function <{}:{}> ({})", proto.source_name, proto.line_defined, proto.debug_name)
    };

    println!("\n{} ({} instructions)", header, proto.instructions.len());
    println!(
        "{}{} params, {} slots, {} upvalue{}, {} constant{}, {} function{}",
        proto.num_params,
        if proto.is_vararg { "+" } else { "" },
        proto.max_stack_size,
        proto.upvalues.len(),
        if proto.upvalues.len() != 1 { "s" } else { "" },
        proto.constants.len(),
        if proto.constants.len() != 1 { "s" } else { "" },
        proto.children.len(),
        if proto.children.len() != 1 { "s" } else { "" },
    );

    for (pc, instr) in proto.instructions.iter().enumerate() {
        let line = proto.line_for(pc);
        println!("\t{}\t[{}]\t{}{}", pc + 1, line, disasm(*instr), comment_for(*instr, proto));
    }

    if !proto.constants.is_empty() {
        println!("constants ({}) for {}:", proto.constants.len(), header);
        for (idx, val) in proto.constants.iter().enumerate() {
            println!("\t{}\t{}", idx, format_constant(val));
        }
    }

    for child in &proto.children {
        dump_proto(child, false);
    }
}
