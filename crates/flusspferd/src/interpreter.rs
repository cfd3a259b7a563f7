//! Tree-walking evaluator
//!
//! Variables are properties of the global object. Every statement runs inside
//! its own [`LocalRootRegion`]: each temporary the statement produces is kept
//! there, so a collection triggered by any allocation never reclaims a value
//! the statement still uses. The completion value lives in a slot of the
//! region enclosing the whole program.

use crate::array::create_array;
use crate::ast::*;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::root::LocalRootRegion;
use crate::value::{number_to_string, Value};
use tracing::trace;

/// Run `program` in `ctx` and return its completion value
pub(crate) fn run(ctx: &Context, program: &Program) -> Result<Value> {
    let outer = LocalRootRegion::in_context(ctx);
    let interpreter = Interpreter {
        ctx,
        global: ctx.global(),
        completion: &outer,
        slot: outer.slot(Value::Undefined),
    };
    trace!(statements = program.statements.len(), "running program");
    interpreter.exec_all(&program.statements)?;
    Ok(interpreter.completion_value())
}

struct Interpreter<'a> {
    ctx: &'a Context,
    global: Object,
    completion: &'a LocalRootRegion,
    slot: usize,
}

impl Interpreter<'_> {
    fn completion_value(&self) -> Value {
        self.ctx.heap().root(self.slot).unwrap_or_default()
    }

    fn exec_all(&self, statements: &[Stmt]) -> Result<()> {
        for statement in statements {
            self.exec(statement)?;
        }
        Ok(())
    }

    fn exec(&self, statement: &Stmt) -> Result<()> {
        let region = LocalRootRegion::in_context(self.ctx);
        match statement {
            Stmt::Empty => {}
            Stmt::Expr { expr, .. } => {
                let value = self.eval(expr, &region)?;
                self.completion.update(self.slot, value);
            }
            Stmt::Var { declarations, .. } => {
                for (name, init) in declarations {
                    match init {
                        Some(init) => {
                            let value = self.eval(init, &region)?;
                            self.global.set_property(name, value)?;
                        }
                        None if !self.global.has_own_property(name)? => {
                            self.global.set_property(name, Value::Undefined)?;
                        }
                        None => {}
                    }
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(condition, &region)?.to_boolean()? {
                    self.exec(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch)?;
                }
            }
            Stmt::Block(statements) => self.exec_all(statements)?,
            Stmt::Throw { value, .. } => {
                let value = self.eval(value, &region)?;
                return Err(Error::from_value(value));
            }
            Stmt::Try {
                body,
                param,
                handler,
            } => match self.exec_all(body) {
                Ok(()) => {}
                Err(err @ Error::Quit(_)) => return Err(err),
                Err(err) => {
                    let caught = region.keep(err.to_value()?);
                    self.global.set_property(param, caught)?;
                    self.exec_all(handler)?;
                }
            },
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, region: &LocalRootRegion) -> Result<Value> {
        let value = match expr {
            Expr::Number(n) => Value::number(*n),
            Expr::String(s) => Value::string(s)?,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Null => Value::Null,
            Expr::Undefined => Value::Undefined,
            Expr::Identifier(name) => self.lookup(name)?,
            Expr::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element, region)?);
                }
                create_array(&values)?.into()
            }
            Expr::Object(properties) => {
                let object = region.keep(Object::create()?);
                for (name, value) in properties {
                    let value = self.eval(value, region)?;
                    object.set_property(name, value)?;
                }
                Value::Object(object)
            }
            Expr::Member { object, name } => {
                let base = self.eval(object, region)?;
                get_member(base, name)?
            }
            Expr::Index { object, index } => {
                let base = self.eval(object, region)?;
                let key = property_key(self.eval(index, region)?)?;
                get_member(base, &key)?
            }
            Expr::Call { callee, args } => self.call(callee, args, region)?,
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, region)?;
                let function = match constructor {
                    Value::Object(f) if f.is_function() => f,
                    other => {
                        return Err(Error::type_error(format!(
                            "{} is not a constructor",
                            describe_callee(callee, other)
                        )));
                    }
                };
                let args = self.eval_args(args, region)?;
                Value::Object(function.construct(&args)?)
            }
            Expr::Assign { target, value } => self.assign(target, value, region)?,
            Expr::Unary { op, operand } => {
                if let (UnaryOp::Typeof, Expr::Identifier(name)) = (op, operand.as_ref()) {
                    if !self.global.has_property(name)? {
                        return Ok(region.keep(Value::string("undefined")?));
                    }
                }
                let value = self.eval(operand, region)?;
                match op {
                    UnaryOp::Not => Value::Bool(!value.to_boolean()?),
                    UnaryOp::Negate => Value::number(-value.to_number()?),
                    UnaryOp::Plus => Value::number(value.to_number()?),
                    UnaryOp::Typeof => Value::string(value.type_of())?,
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, region)?;
                let right = self.eval(right, region)?;
                binary(*op, left, right)?
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, region)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.to_boolean()?,
                    LogicalOp::Or => left.to_boolean()?,
                };
                if short_circuit {
                    left
                } else {
                    self.eval(right, region)?
                }
            }
        };
        Ok(region.keep(value))
    }

    fn eval_args(&self, args: &[Expr], region: &LocalRootRegion) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, region)).collect()
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if !self.global.has_property(name)? {
            return Err(Error::reference_error(format!("{} is not defined", name)));
        }
        self.global.get_property(name)
    }

    fn call(&self, callee: &Expr, args: &[Expr], region: &LocalRootRegion) -> Result<Value> {
        let (this, function) = match callee {
            Expr::Member { object, name } => {
                let base = self.eval(object, region)?;
                (base, region.keep(get_member(base, name)?))
            }
            Expr::Index { object, index } => {
                let base = self.eval(object, region)?;
                let key = property_key(self.eval(index, region)?)?;
                (base, region.keep(get_member(base, &key)?))
            }
            other => (Value::Undefined, self.eval(other, region)?),
        };
        let function = match function {
            Value::Object(f) if f.is_function() => f,
            other => {
                return Err(Error::type_error(format!(
                    "{} is not a function",
                    describe_callee(callee, other)
                )));
            }
        };
        let args = self.eval_args(args, region)?;
        function.call_with(this, &args)
    }

    fn assign(&self, target: &Expr, value: &Expr, region: &LocalRootRegion) -> Result<Value> {
        match target {
            Expr::Identifier(name) => {
                let value = self.eval(value, region)?;
                self.global.set_property(name, value)?;
                Ok(value)
            }
            Expr::Member { object, name } => {
                let base = target_object(self.eval(object, region)?, name)?;
                let value = self.eval(value, region)?;
                base.set_property(name, value)?;
                Ok(value)
            }
            Expr::Index { object, index } => {
                let base = self.eval(object, region)?;
                let key = property_key(self.eval(index, region)?)?;
                let base = target_object(base, &key)?;
                let value = self.eval(value, region)?;
                base.set_property(&key, value)?;
                Ok(value)
            }
            _ => Err(Error::syntax_error("invalid assignment target")),
        }
    }
}

fn get_member(base: Value, key: &str) -> Result<Value> {
    match base {
        Value::Object(object) => object.get_property(key),
        Value::Undefined | Value::Null => Err(Error::type_error(format!(
            "cannot read property '{}' of {}",
            key,
            base.kind_name()
        ))),
        Value::String(s) => {
            let text = s.text()?;
            if key == "length" {
                return Ok(Value::number(text.chars().count() as f64));
            }
            match key.parse::<usize>().ok().and_then(|i| text.chars().nth(i)) {
                Some(c) => Value::string(c.encode_utf8(&mut [0; 4])),
                None => Ok(Value::Undefined),
            }
        }
        _ => Ok(Value::Undefined),
    }
}

fn target_object(base: Value, key: &str) -> Result<Object> {
    match base {
        Value::Object(object) => Ok(object),
        other => Err(Error::type_error(format!(
            "cannot set property '{}' of {}",
            key,
            other.kind_name()
        ))),
    }
}

fn property_key(value: Value) -> Result<String> {
    match value {
        Value::Int(n) => Ok(n.to_string()),
        Value::Double(n) => Ok(number_to_string(n)),
        other => other.to_std_string(),
    }
}

fn describe_callee(callee: &Expr, value: Value) -> String {
    match callee {
        Expr::Identifier(name) => name.clone(),
        Expr::Member { name, .. } => name.clone(),
        _ => value.kind_name().to_string(),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    Ok(match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() || left.is_object() || right.is_object() {
                let text = format!("{}{}", left.to_std_string()?, right.to_std_string()?);
                Value::string(&text)?
            } else {
                Value::number(left.to_number()? + right.to_number()?)
            }
        }
        BinaryOp::Sub => Value::number(left.to_number()? - right.to_number()?),
        BinaryOp::Mul => Value::number(left.to_number()? * right.to_number()?),
        BinaryOp::Div => Value::number(left.to_number()? / right.to_number()?),
        BinaryOp::Rem => Value::number(left.to_number()? % right.to_number()?),
        BinaryOp::Eq => Value::Bool(left.loose_equals(&right)?),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(&right)?),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(&right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(&right)),
        BinaryOp::Less => compare(left, right, |o| o.is_lt())?,
        BinaryOp::LessEq => compare(left, right, |o| o.is_le())?,
        BinaryOp::Greater => compare(left, right, |o| o.is_gt())?,
        BinaryOp::GreaterEq => compare(left, right, |o| o.is_ge())?,
    })
}

fn compare(left: Value, right: Value, test: fn(std::cmp::Ordering) -> bool) -> Result<Value> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(Value::Bool(test(a.text()?.cmp(&b.text()?))));
    }
    let ordering = left.to_number()?.partial_cmp(&right.to_number()?);
    Ok(Value::Bool(ordering.is_some_and(test)))
}
