use std::cell::Cell;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn single_point(line: usize, column: usize) -> Self {
        Self::new(line, column, line, column)
    }

    pub fn union(a: &Self, b: &Self) -> Self {
        if a.line == 0 {
            return *b;
        }
        if b.line == 0 {
            return *a;
        }

        let (start_line, start_column) =
            if (a.line < b.line) || (a.line == b.line && a.column <= b.column) {
                (a.line, a.column)
            } else {
                (b.line, b.column)
            };

        let (end_line, end_column) = if (a.end_line > b.end_line)
            || (a.end_line == b.end_line && a.end_column >= b.end_column)
        {
            (a.end_line, a.end_column)
        } else {
            (b.end_line, b.end_column)
        };

        Self::new(start_line, start_column, end_line, end_column)
    }
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self {
            line: 0,
            column: 0,
            end_line: 0,
            end_column: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub statements: Vec<Statement>,
}

impl Module {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub id: NodeId,
    pub span: SourceSpan,
    pub kind: StatementKind,
}

impl Statement {
    /// Attaches decorators to a function or class definition. Other
    /// statements are returned unchanged.
    pub fn with_decorators(mut self, decorators: Vec<Expression>) -> Self {
        match &mut self.kind {
            StatementKind::FunctionDef(function) => function.decorators = decorators,
            StatementKind::ClassDef(class) => class.decorators = decorators,
            _ => {}
        }
        self
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expression>),
    Assign(AssignStatement),
    AnnAssign(AnnAssignStatement),
    AugAssign(AugAssignStatement),
    If(IfStatement),
    While(WhileStatement),
    For(ForStatement),
    Expression(Expression),
    Assert(AssertStatement),
    Raise(Option<Expression>),
    Import(Vec<ImportAlias>),
    ImportFrom(ImportFromStatement),
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub name_span: SourceSpan,
    pub is_async: bool,
    pub decorators: Vec<Expression>,
    pub parameters: Vec<Parameter>,
    pub returns: Option<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: NodeId,
    pub name: String,
    pub span: SourceSpan,
    pub annotation: Option<Expression>,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub name_span: SourceSpan,
    pub decorators: Vec<Expression>,
    pub bases: Vec<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct AssignStatement {
    pub targets: Vec<Expression>,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct AnnAssignStatement {
    pub target: Expression,
    pub annotation: Expression,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct AugAssignStatement {
    pub target: Expression,
    pub operator: BinaryOperator,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub test: Expression,
    pub body: Vec<Statement>,
    pub orelse: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Vec<Statement>,
    pub orelse: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct ForStatement {
    pub target: Expression,
    pub iter: Expression,
    pub body: Vec<Statement>,
    pub orelse: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct AssertStatement {
    pub test: Expression,
    pub message: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct ImportAlias {
    pub name: String,
    pub alias: Option<String>,
    pub span: SourceSpan,
}

impl ImportAlias {
    /// The name the import binds in the importing module.
    pub fn bound_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportFromStatement {
    pub module: String,
    pub names: Vec<ImportAlias>,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub id: NodeId,
    pub span: SourceSpan,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Name(String),
    Constant(Constant),
    Attribute(AttributeExpression),
    Call(CallExpression),
    BoolOp(BoolOpExpression),
    Binary(BinaryExpression),
    Unary(UnaryExpression),
    Compare(CompareExpression),
    IfExp(IfExpression),
    Tuple(Vec<Expression>),
    List(Vec<Expression>),
    Dict(DictExpression),
    Subscript(SubscriptExpression),
    Await(Box<Expression>),
    Lambda(LambdaExpression),
}

#[derive(Debug, Clone)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct AttributeExpression {
    pub value: Box<Expression>,
    pub attr: String,
}

#[derive(Debug, Clone)]
pub struct CallExpression {
    pub func: Box<Expression>,
    pub args: Vec<Expression>,
    pub keywords: Vec<KeywordArgument>,
}

#[derive(Debug, Clone)]
pub struct KeywordArgument {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct BoolOpExpression {
    pub operator: BoolOperator,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    BitOr,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::BitOr => "|",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinaryExpression {
    pub left: Box<Expression>,
    pub operator: BinaryOperator,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Positive,
    Negative,
    Not,
    Invert,
}

#[derive(Debug, Clone)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
pub struct CompareExpression {
    pub left: Box<Expression>,
    pub operators: Vec<CompareOperator>,
    pub comparators: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub struct IfExpression {
    pub test: Box<Expression>,
    pub body: Box<Expression>,
    pub orelse: Box<Expression>,
}

#[derive(Debug, Clone)]
pub struct DictExpression {
    pub keys: Vec<Expression>,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub struct SubscriptExpression {
    pub value: Box<Expression>,
    pub index: Box<Expression>,
}

#[derive(Debug, Clone)]
pub struct LambdaExpression {
    pub parameters: Vec<Parameter>,
    pub body: Box<Expression>,
}

/// Constructs syntax trees with unique node ids.
///
/// Every node created gets the builder's current position; move the cursor
/// with [`AstBuilder::at`] before building the nodes a test wants to locate.
/// Methods take `&self` so nested construction like
/// `b.call(b.name("f"), vec![])` works.
#[derive(Debug)]
pub struct AstBuilder {
    next_id: Cell<u32>,
    line: Cell<usize>,
    column: Cell<usize>,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            line: Cell::new(1),
            column: Cell::new(0),
        }
    }

    pub fn at(&self, line: usize, column: usize) -> &Self {
        self.line.set(line);
        self.column.set(column);
        self
    }

    pub fn span(&self) -> SourceSpan {
        SourceSpan::single_point(self.line.get(), self.column.get())
    }

    fn next_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn expr(&self, kind: ExpressionKind) -> Expression {
        Expression {
            id: self.next_id(),
            span: self.span(),
            kind,
        }
    }

    fn stmt(&self, kind: StatementKind) -> Statement {
        Statement {
            id: self.next_id(),
            span: self.span(),
            kind,
        }
    }

    pub fn module(&self, statements: Vec<Statement>) -> Module {
        Module::new(statements)
    }

    pub fn name(&self, id: &str) -> Expression {
        self.expr(ExpressionKind::Name(id.to_string()))
    }

    pub fn none(&self) -> Expression {
        self.expr(ExpressionKind::Constant(Constant::None))
    }

    pub fn bool(&self, value: bool) -> Expression {
        self.expr(ExpressionKind::Constant(Constant::Bool(value)))
    }

    pub fn int(&self, value: i64) -> Expression {
        self.expr(ExpressionKind::Constant(Constant::Int(value)))
    }

    pub fn float(&self, value: f64) -> Expression {
        self.expr(ExpressionKind::Constant(Constant::Float(value)))
    }

    pub fn str(&self, value: &str) -> Expression {
        self.expr(ExpressionKind::Constant(Constant::Str(value.to_string())))
    }

    pub fn attr(&self, value: Expression, attr: &str) -> Expression {
        self.expr(ExpressionKind::Attribute(AttributeExpression {
            value: Box::new(value),
            attr: attr.to_string(),
        }))
    }

    pub fn call(&self, func: Expression, args: Vec<Expression>) -> Expression {
        self.call_kw(func, args, Vec::new())
    }

    pub fn call_kw(
        &self,
        func: Expression,
        args: Vec<Expression>,
        keywords: Vec<(&str, Expression)>,
    ) -> Expression {
        self.expr(ExpressionKind::Call(CallExpression {
            func: Box::new(func),
            args,
            keywords: keywords
                .into_iter()
                .map(|(name, value)| KeywordArgument {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }))
    }

    pub fn or(&self, values: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::BoolOp(BoolOpExpression {
            operator: BoolOperator::Or,
            values,
        }))
    }

    pub fn and(&self, values: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::BoolOp(BoolOpExpression {
            operator: BoolOperator::And,
            values,
        }))
    }

    pub fn binary(
        &self,
        left: Expression,
        operator: BinaryOperator,
        right: Expression,
    ) -> Expression {
        self.expr(ExpressionKind::Binary(BinaryExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }))
    }

    pub fn unary(&self, operator: UnaryOperator, operand: Expression) -> Expression {
        self.expr(ExpressionKind::Unary(UnaryExpression {
            operator,
            operand: Box::new(operand),
        }))
    }

    pub fn not(&self, operand: Expression) -> Expression {
        self.unary(UnaryOperator::Not, operand)
    }

    pub fn compare(
        &self,
        left: Expression,
        operator: CompareOperator,
        right: Expression,
    ) -> Expression {
        self.expr(ExpressionKind::Compare(CompareExpression {
            left: Box::new(left),
            operators: vec![operator],
            comparators: vec![right],
        }))
    }

    pub fn if_exp(&self, test: Expression, body: Expression, orelse: Expression) -> Expression {
        self.expr(ExpressionKind::IfExp(IfExpression {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        }))
    }

    pub fn tuple(&self, elements: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::Tuple(elements))
    }

    pub fn list(&self, elements: Vec<Expression>) -> Expression {
        self.expr(ExpressionKind::List(elements))
    }

    pub fn dict(&self, entries: Vec<(Expression, Expression)>) -> Expression {
        let (keys, values) = entries.into_iter().unzip();
        self.expr(ExpressionKind::Dict(DictExpression { keys, values }))
    }

    pub fn subscript(&self, value: Expression, index: Expression) -> Expression {
        self.expr(ExpressionKind::Subscript(SubscriptExpression {
            value: Box::new(value),
            index: Box::new(index),
        }))
    }

    pub fn await_(&self, value: Expression) -> Expression {
        self.expr(ExpressionKind::Await(Box::new(value)))
    }

    pub fn lambda(&self, parameters: Vec<Parameter>, body: Expression) -> Expression {
        self.expr(ExpressionKind::Lambda(LambdaExpression {
            parameters,
            body: Box::new(body),
        }))
    }

    pub fn param(&self, name: &str, annotation: Option<Expression>) -> Parameter {
        Parameter {
            id: self.next_id(),
            name: name.to_string(),
            span: self.span(),
            annotation,
            default: None,
        }
    }

    pub fn param_default(
        &self,
        name: &str,
        annotation: Option<Expression>,
        default: Expression,
    ) -> Parameter {
        Parameter {
            default: Some(default),
            ..self.param(name, annotation)
        }
    }

    pub fn function_def(
        &self,
        name: &str,
        parameters: Vec<Parameter>,
        returns: Option<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        self.stmt(StatementKind::FunctionDef(FunctionDef {
            name: name.to_string(),
            name_span: self.span(),
            is_async: false,
            decorators: Vec::new(),
            parameters,
            returns,
            body,
        }))
    }

    pub fn async_function_def(
        &self,
        name: &str,
        parameters: Vec<Parameter>,
        returns: Option<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        let mut statement = self.function_def(name, parameters, returns, body);
        if let StatementKind::FunctionDef(function) = &mut statement.kind {
            function.is_async = true;
        }
        statement
    }

    pub fn class_def(&self, name: &str, bases: Vec<Expression>, body: Vec<Statement>) -> Statement {
        self.stmt(StatementKind::ClassDef(ClassDef {
            name: name.to_string(),
            name_span: self.span(),
            decorators: Vec::new(),
            bases,
            body,
        }))
    }

    pub fn ret(&self, value: Option<Expression>) -> Statement {
        self.stmt(StatementKind::Return(value))
    }

    pub fn assign(&self, target: Expression, value: Expression) -> Statement {
        self.stmt(StatementKind::Assign(AssignStatement {
            targets: vec![target],
            value,
        }))
    }

    pub fn ann_assign(
        &self,
        target: Expression,
        annotation: Expression,
        value: Option<Expression>,
    ) -> Statement {
        self.stmt(StatementKind::AnnAssign(AnnAssignStatement {
            target,
            annotation,
            value,
        }))
    }

    pub fn aug_assign(
        &self,
        target: Expression,
        operator: BinaryOperator,
        value: Expression,
    ) -> Statement {
        self.stmt(StatementKind::AugAssign(AugAssignStatement {
            target,
            operator,
            value,
        }))
    }

    pub fn if_stmt(
        &self,
        test: Expression,
        body: Vec<Statement>,
        orelse: Vec<Statement>,
    ) -> Statement {
        self.stmt(StatementKind::If(IfStatement { test, body, orelse }))
    }

    pub fn while_stmt(
        &self,
        test: Expression,
        body: Vec<Statement>,
        orelse: Vec<Statement>,
    ) -> Statement {
        self.stmt(StatementKind::While(WhileStatement { test, body, orelse }))
    }

    pub fn for_stmt(
        &self,
        target: Expression,
        iter: Expression,
        body: Vec<Statement>,
    ) -> Statement {
        self.stmt(StatementKind::For(ForStatement {
            target,
            iter,
            body,
            orelse: Vec::new(),
        }))
    }

    pub fn expr_stmt(&self, expression: Expression) -> Statement {
        self.stmt(StatementKind::Expression(expression))
    }

    pub fn assert_stmt(&self, test: Expression) -> Statement {
        self.stmt(StatementKind::Assert(AssertStatement {
            test,
            message: None,
        }))
    }

    pub fn raise(&self, exception: Option<Expression>) -> Statement {
        self.stmt(StatementKind::Raise(exception))
    }

    pub fn import(&self, module: &str) -> Statement {
        self.stmt(StatementKind::Import(vec![ImportAlias {
            name: module.to_string(),
            alias: None,
            span: self.span(),
        }]))
    }

    pub fn import_from(&self, module: &str, names: &[&str]) -> Statement {
        self.stmt(StatementKind::ImportFrom(ImportFromStatement {
            module: module.to_string(),
            names: names
                .iter()
                .map(|name| ImportAlias {
                    name: name.to_string(),
                    alias: None,
                    span: self.span(),
                })
                .collect(),
        }))
    }

    pub fn pass(&self) -> Statement {
        self.stmt(StatementKind::Pass)
    }

    pub fn break_stmt(&self) -> Statement {
        self.stmt(StatementKind::Break)
    }

    pub fn continue_stmt(&self) -> Statement {
        self.stmt(StatementKind::Continue)
    }
}
