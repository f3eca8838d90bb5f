use crate::token::Token;
use std::cell::Cell;
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

/// Number of scopes between a reference and its declaration, filled in by the
/// resolver. `None` means the name lives in the global scope.
pub type Depth = Cell<Option<usize>>;

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Nil => write!(f, "nil"),
            LiteralValue::Boolean(x) => write!(f, "{}", x),
            LiteralValue::Number(x) => write!(f, "{}", x),
            LiteralValue::String(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Debug)]
pub enum Expression {
    Literal(LiteralValue),
    Grouping(Box<Expression>),
    Unary {
        operator: Token,
        right: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Variable {
        name: Token,
        depth: Depth,
    },
    Assign {
        name: Token,
        value: Box<Expression>,
        depth: Depth,
    },
    Call {
        callee: Box<Expression>,
        paren: Token,
        arguments: Vec<Expression>,
    },
    Get {
        object: Box<Expression>,
        name: Token,
    },
    Set {
        object: Box<Expression>,
        name: Token,
        value: Box<Expression>,
    },
    This {
        keyword: Token,
        depth: Depth,
    },
    Super {
        keyword: Token,
        method: Token,
        depth: Depth,
    },
    Function(Rc<FunctionDecl>),
}

/// Shared between the tree and every function value created from it, so a
/// function defined on one REPL line outlives that line's statements.
#[derive(Debug)]
pub struct FunctionDecl {
    /// `None` for anonymous function expressions.
    pub name: Option<Token>,
    /// The name token, or `fun` for anonymous functions. Used for error lines.
    pub keyword: Token,
    pub params: Vec<Token>,
    pub body: Vec<Statement>,
}

impl FunctionDecl {
    pub fn name(&self) -> &str {
        self.name.as_ref().map_or("", |x| x.lexeme.as_str())
    }
}

#[derive(Debug)]
pub enum Statement {
    Expression(Expression),
    Print {
        keyword: Token,
        value: Expression,
    },
    Var {
        name: Token,
        initializer: Option<Expression>,
    },
    Block(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expression>,
    },
    Class {
        name: Token,
        superclass: Option<Expression>,
        methods: Vec<Rc<FunctionDecl>>,
    },
}

pub trait Visitor<T, Output> {
    fn visit(&mut self, n: &T) -> Output;
}

impl Expression {
    pub fn accept<T, V: Visitor<Expression, T> + ?Sized>(&self, v: &mut V) -> T {
        v.visit(self)
    }
}

impl Statement {
    pub fn accept<T, V: Visitor<Statement, T> + ?Sized>(&self, v: &mut V) -> T {
        v.visit(self)
    }
}

/// Renders trees as S-expressions, e.g. `(* (- 123) (group 45.67))`.
pub struct AstPrinter {}

impl AstPrinter {
    pub fn print(&mut self, statements: &[Statement]) -> String {
        statements
            .iter()
            .map(|stmt| stmt.accept(self))
            .collect::<Vec<String>>()
            .join("\n")
    }
    fn parenthesize(&mut self, name: &str, args: Vec<&Expression>) -> String {
        let mut x = String::from("(");
        x.push_str(name);
        for arg in args {
            x.push(' ');
            x.push_str(arg.accept(self).as_str());
        }
        x.push(')');
        x
    }
    fn function(&mut self, decl: &FunctionDecl) -> String {
        let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();
        let mut x = format!("(fun {}({})", decl.name(), params.join(" "));
        for stmt in &decl.body {
            x.push(' ');
            x.push_str(stmt.accept(self).as_str());
        }
        x.push(')');
        x
    }
}

impl Visitor<Expression, String> for AstPrinter {
    fn visit(&mut self, n: &Expression) -> String {
        match n {
            Expression::Binary {
                left,
                operator,
                right,
            }
            | Expression::Logical {
                left,
                operator,
                right,
            } => self.parenthesize(&operator.lexeme, vec![left.as_ref(), right.as_ref()]),
            Expression::Grouping(x) => self.parenthesize("group", vec![x.as_ref()]),
            Expression::Literal(x) => x.to_string(),
            Expression::Unary { operator, right } => {
                self.parenthesize(&operator.lexeme, vec![right.as_ref()])
            }
            Expression::Variable { name, .. } => name.lexeme.clone(),
            Expression::Assign { name, value, .. } => {
                format!("(assign {} {})", name.lexeme, value.accept(self))
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                let mut args = vec![callee.as_ref()];
                args.extend(arguments.iter());
                self.parenthesize("call", args)
            }
            Expression::Get { object, name } => {
                format!("(get {} {})", object.accept(self), name.lexeme)
            }
            Expression::Set {
                object,
                name,
                value,
            } => format!(
                "(set {} {} {})",
                object.accept(self),
                name.lexeme,
                value.accept(self)
            ),
            Expression::This { .. } => String::from("this"),
            Expression::Super { method, .. } => format!("(super {})", method.lexeme),
            Expression::Function(decl) => self.function(decl),
        }
    }
}

impl Visitor<Statement, String> for AstPrinter {
    fn visit(&mut self, n: &Statement) -> String {
        match n {
            Statement::Expression(e) => self.parenthesize(";", vec![e]),
            Statement::Print { value, .. } => self.parenthesize("print", vec![value]),
            Statement::Var { name, initializer } => match initializer {
                Some(x) => format!("(var {} {})", name.lexeme, x.accept(self)),
                None => format!("(var {})", name.lexeme),
            },
            Statement::Block(stmts) => {
                let mut x = String::from("(block");
                for stmt in stmts {
                    x.push(' ');
                    x.push_str(stmt.accept(self).as_str());
                }
                x.push(')');
                x
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(e) => format!(
                    "(if {} {} {})",
                    condition.accept(self),
                    then_branch.accept(self),
                    e.accept(self)
                ),
                None => format!(
                    "(if {} {})",
                    condition.accept(self),
                    then_branch.accept(self)
                ),
            },
            Statement::While { condition, body } => {
                format!("(while {} {})", condition.accept(self), body.accept(self))
            }
            Statement::Function(decl) => self.function(decl),
            Statement::Return { value, .. } => match value {
                Some(x) => self.parenthesize("return", vec![x]),
                None => String::from("(return)"),
            },
            Statement::Class {
                name,
                superclass,
                methods,
            } => {
                let mut x = format!("(class {}", name.lexeme);
                if let Some(s) = superclass {
                    x.push_str(" < ");
                    x.push_str(s.accept(self).as_str());
                }
                for method in methods {
                    x.push(' ');
                    x.push_str(self.function(method).as_str());
                }
                x.push(')');
                x
            }
        }
    }
}

#[cfg(test)]
mod ast_tests {
    use crate::ast::{AstPrinter, Expression, LiteralValue};
    use crate::parser;
    use crate::scanner;
    use crate::token::{Token, TokenType};

    fn print_program(source: &str) -> String {
        let (tokens, errors) = scanner::scan_tokens(source);
        assert!(errors.is_empty());
        let (statements, errors) = parser::parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);
        AstPrinter {}.print(&statements)
    }

    #[test]
    fn basic_ast_test() {
        let expression = Expression::Binary {
            left: Box::new(Expression::Unary {
                operator: Token::new(TokenType::Minus, "-", 1),
                right: Box::new(Expression::Literal(LiteralValue::Number(123.0))),
            }),
            operator: Token::new(TokenType::Star, "*", 1),
            right: Box::new(Expression::Grouping(Box::new(Expression::Literal(
                LiteralValue::Number(45.67),
            )))),
        };
        let mut visitor = AstPrinter {};
        assert_eq!(expression.accept(&mut visitor), "(* (- 123) (group 45.67))");
    }

    #[test]
    fn precedence_is_visible_in_tree() {
        assert_eq!(print_program("2 + 3 * 4;"), "(; (+ 2 (* 3 4)))");
        assert_eq!(print_program("(2 + 3) * 4;"), "(; (* (group (+ 2 3)) 4))");
        assert_eq!(print_program("a = b = 1;"), "(; (assign a (assign b 1)))");
        assert_eq!(print_program("1 - 2 - 3;"), "(; (- (- 1 2) 3))");
    }

    #[test]
    fn statements_and_classes() {
        assert_eq!(
            print_program("for (var i = 0; i < 2; i = i + 1) print i;"),
            "(block (var i 0) (while (< i 2) (block (print i) (; (assign i (+ i 1))))))"
        );
        assert_eq!(
            print_program("class B < A { m(x) { return super.m(x); } }"),
            "(class B < A (fun m(x) (return (call (super m) x))))"
        );
        assert_eq!(
            print_program("o.f = fun (a, b) { print a.g; };"),
            "(; (set o f (fun (a b) (print (get a g)))))"
        );
    }
}
